//! Inbound transport callbacks and outbound provisioning events.
//!
//! [`TransportEvent`]s arrive from the platform's GATT stack (tagged with the
//! [`LinkId`] they belong to) and are fed to the
//! [`ProvisioningSupervisor`](super::supervisor::ProvisioningSupervisor).
//! [`ProvisioningEvent`]s flow the other way, to the caller, wrapped in an
//! [`Outcome`] that names the session they belong to.

use core::fmt;

use uuid::Uuid;

use crate::error::ProvisioningError;

// ───────────────────────────────────────────────────────────────
// Identities
// ───────────────────────────────────────────────────────────────

/// Opaque transport address of the peripheral (e.g. a BLE MAC).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub String);

impl PeripheralId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle for one connection attempt, minted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u32);

/// Identifies one provisioning session within a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw GATT status code.  Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattStatus(u8);

impl GattStatus {
    pub const SUCCESS: Self = Self(0);

    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Discovered GATT database
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

impl GattCharacteristic {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            descriptors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_descriptor(mut self, uuid: Uuid) -> Self {
        self.descriptors.push(uuid);
        self
    }

    pub fn has_descriptor(&self, uuid: Uuid) -> bool {
        self.descriptors.contains(&uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Address of one characteristic on the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

// ───────────────────────────────────────────────────────────────
// Inbound: transport completions
// ───────────────────────────────────────────────────────────────

/// Asynchronous completion reported by the GATT stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    ConnectFailed(GattStatus),
    /// Link dropped; non-zero status is abnormal.
    Disconnected(GattStatus),
    ServicesDiscovered(Result<Vec<GattService>, GattStatus>),
    DescriptorWritten(Result<(), GattStatus>),
    CharacteristicWritten(Result<(), GattStatus>),
    CharacteristicRead(Result<Vec<u8>, GattStatus>),
    /// Unsolicited value change on a characteristic with notifications on.
    Notification(Vec<u8>),
}

// ───────────────────────────────────────────────────────────────
// Outbound: caller-facing events
// ───────────────────────────────────────────────────────────────

/// Result of a successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedDevice {
    pub peripheral: PeripheralId,
    /// Address the peripheral reported after joining, if any.
    pub ip_address: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningEvent {
    /// Session created; connection about to be attempted.
    Started,
    Connected,
    Disconnected,
    Progress(String),
    Success(ProvisionedDevice),
    Failed(ProvisioningError),
    Error(ProvisioningError),
}

impl ProvisioningEvent {
    /// `Success`, `Failed` and `Error` end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Failed(_) | Self::Error(_))
    }
}

/// One event on the outcome stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub session: SessionId,
    pub event: ProvisioningEvent,
}
