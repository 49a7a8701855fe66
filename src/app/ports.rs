//! Port traits: the hexagonal boundary between the provisioning core and the outside world.
//!
//! ```text
//!   GATT stack ──▶ GattTransport ──▶ ProvisioningSupervisor (domain)
//!                                          │
//!                 EventSink / DeviceStore ◀┘
//! ```
//!
//! Adapters implement these traits.  The supervisor receives them as
//! `&mut impl Trait` at each call site and never stores them, so the domain
//! core is testable with a scripted peripheral and no radio.
//!
//! ## Transport contract
//!
//! - Every request method returns whether the request was **accepted** for
//!   asynchronous execution.  `Err` means nothing will complete later.
//! - Completions arrive out-of-band as
//!   [`TransportEvent`](super::events::TransportEvent)s tagged with the
//!   [`LinkId`] returned by [`GattTransport::connect`].
//! - Completions for one link arrive in request order.
//! - `disconnect` and `close` are best effort and must tolerate a link that
//!   is already gone.

use super::events::{CharacteristicRef, LinkId, Outcome, PeripheralId};
use crate::error::TransportError;
use uuid::Uuid;

// ───────────────────────────────────────────────────────────────
// GATT transport (driven adapter: domain → radio)
// ───────────────────────────────────────────────────────────────

/// Platform GATT client primitives.
pub trait GattTransport {
    /// Open a link.  `Connected` / `ConnectFailed` follows.
    fn connect(&mut self, peripheral: &PeripheralId) -> Result<LinkId, TransportError>;

    /// `ServicesDiscovered` follows.
    fn discover_services(&mut self, link: LinkId) -> Result<(), TransportError>;

    /// Local notification registration.  No completion event.
    fn set_notifications(
        &mut self,
        link: LinkId,
        characteristic: &CharacteristicRef,
        enable: bool,
    ) -> Result<(), TransportError>;

    /// `DescriptorWritten` follows.
    fn write_descriptor(
        &mut self,
        link: LinkId,
        characteristic: &CharacteristicRef,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError>;

    /// `CharacteristicWritten` follows.
    fn write_characteristic(
        &mut self,
        link: LinkId,
        characteristic: &CharacteristicRef,
        value: &[u8],
    ) -> Result<(), TransportError>;

    /// `CharacteristicRead` follows.
    fn read_characteristic(
        &mut self,
        link: LinkId,
        characteristic: &CharacteristicRef,
    ) -> Result<(), TransportError>;

    fn disconnect(&mut self, link: LinkId);

    /// Free the platform handle.  Always called after `disconnect`.
    fn close(&mut self, link: LinkId);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / UI)
// ───────────────────────────────────────────────────────────────

/// Secondary observer for outcomes (the outcome stream is primary).
pub trait EventSink {
    fn emit(&mut self, outcome: &Outcome);
}

// ───────────────────────────────────────────────────────────────
// Device store port (driven adapter: caller ↔ persistent settings)
// ───────────────────────────────────────────────────────────────

/// Where provisioned device addresses are remembered.
///
/// Never receives credentials.  Only the IP address a peripheral reported
/// after joining and the key it is filed under.
pub trait DeviceStore {
    /// File `ip` under `device_ip_<key>` and mark it as the last provisioned device.
    fn record_device_ip(&mut self, key: &str, ip: &str) -> Result<(), StoreError>;

    fn device_ip(&self, key: &str) -> Option<String>;

    /// `(device key, ip)` of the most recently provisioned device.
    fn last_provisioned(&self) -> Option<(String, String)>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds.  Only differences are meaningful.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`DeviceStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Key exceeds the backend's limit.
    KeyTooLong,
    /// Backend is full.
    Full,
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::KeyTooLong => write!(f, "key too long"),
            Self::Full => write!(f, "store full"),
        }
    }
}

impl std::error::Error for StoreError {}
