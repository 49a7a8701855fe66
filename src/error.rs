//! Unified error types for the provisioning core.
//!
//! Every failure a session can report funnels into [`ProvisioningError`].
//! The categories mirror how the session reacts to them:
//!
//! | Category      | Type                  | Session reaction                    |
//! |---------------|-----------------------|-------------------------------------|
//! | Transport     | [`TransportError`]    | retried up to the bound, then fatal |
//! | Capability    | [`CapabilityError`]   | fatal, never retried                |
//! | Transmission  | [`TransmissionError`] | fatal for that step                 |
//! | Peripheral    | `Peripheral(String)`  | fatal, message passed through       |
//! | Credentials   | [`CredentialError`]   | rejected before any radio activity  |
//!
//! Malformed status payloads never appear here: the codec always produces
//! a report.

use core::fmt;

use uuid::Uuid;

use crate::app::events::GattStatus;

// ---------------------------------------------------------------------------
// Top-level provisioning error
// ---------------------------------------------------------------------------

/// Every terminal failure reported by a session carries one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    /// A transport failure that the retry policy refused to retry.
    Transport(TransportError),
    /// Connection attempts exceeded the configured bound.
    RetriesExhausted { attempts: u8, last: TransportError },
    /// Service discovery itself failed (not a missing capability).
    Discovery(TransportError),
    /// The peripheral does not expose a required capability.
    Capability(CapabilityError),
    /// Writing the credential payload failed.
    Transmission(TransmissionError),
    /// The peripheral reported `failed`/`error`; message is verbatim.
    Peripheral(String),
    /// The caller cancelled the session.
    Cancelled,
    /// Credentials were rejected before a session was created.
    Credentials(CredentialError),
}

impl ProvisioningError {
    /// Short machine-friendly category tag (for logs and metrics labels).
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) | Self::RetriesExhausted { .. } => "transport",
            Self::Discovery(_) => "discovery",
            Self::Capability(_) => "capability",
            Self::Transmission(_) => "transmission",
            Self::Peripheral(_) => "peripheral",
            Self::Cancelled => "cancelled",
            Self::Credentials(_) => "credentials",
        }
    }
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "connection failed: {e}"),
            Self::RetriesExhausted { attempts, last } => {
                write!(f, "connection failed after {attempts} attempts ({last})")
            }
            Self::Discovery(e) => write!(f, "service discovery failed: {e}"),
            Self::Capability(e) => write!(f, "{e}"),
            Self::Transmission(e) => write!(f, "{e}"),
            Self::Peripheral(msg) if msg.is_empty() => write!(f, "WiFi connection failed"),
            Self::Peripheral(msg) => write!(f, "WiFi connection failed: {msg}"),
            Self::Cancelled => write!(f, "provisioning cancelled"),
            Self::Credentials(e) => write!(f, "invalid credentials: {e}"),
        }
    }
}

impl std::error::Error for ProvisioningError {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The platform refused to accept the request for execution.
    Rejected,
    /// The platform denied a Bluetooth permission.
    PermissionDenied,
    /// The request targeted a link that is no longer connected.
    NotConnected,
    /// No adapter, or the connection handle could not be created.
    Unavailable,
    /// The connect attempt completed with a failure status.
    Status(GattStatus),
    /// The connect attempt did not complete before the connection timeout.
    Timeout,
    /// The link dropped.
    Disconnected(GattStatus),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "request rejected by transport"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Unavailable => write!(f, "transport unavailable"),
            Self::Status(s) => write!(f, "connection error (status: {})", s.code()),
            Self::Timeout => write!(f, "connection timeout"),
            Self::Disconnected(s) => write!(f, "disconnected (status: {})", s.code()),
        }
    }
}

impl From<TransportError> for ProvisioningError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Capability errors
// ---------------------------------------------------------------------------

/// A required service or characteristic is missing from the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    ServiceNotFound(Uuid),
    CredentialCharacteristicNotFound(Uuid),
    StatusCharacteristicNotFound(Uuid),
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceNotFound(u) => write!(
                f,
                "provisioning service {u} not found; make sure the device is in provisioning mode"
            ),
            Self::CredentialCharacteristicNotFound(u) => {
                write!(f, "WiFi config characteristic {u} not found")
            }
            Self::StatusCharacteristicNotFound(u) => {
                write!(f, "WiFi status characteristic {u} not found")
            }
        }
    }
}

impl From<CapabilityError> for ProvisioningError {
    fn from(e: CapabilityError) -> Self {
        Self::Capability(e)
    }
}

// ---------------------------------------------------------------------------
// Transmission errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionError {
    /// The credential write completed with a failure status.
    WriteFailed(GattStatus),
    /// The credential write was never accepted by the transport.
    WriteRejected(TransportError),
    /// The credential payload could not be serialised.
    EncodeFailed,
}

impl fmt::Display for TransmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed(s) => {
                write!(f, "write failed for WiFi config characteristic, status: {}", s.code())
            }
            Self::WriteRejected(e) => write!(f, "failed to send WiFi configuration: {e}"),
            Self::EncodeFailed => write!(f, "error creating WiFi configuration"),
        }
    }
}

impl From<TransmissionError> for ProvisioningError {
    fn from(e: TransmissionError) -> Self {
        Self::Transmission(e)
    }
}

// ---------------------------------------------------------------------------
// Credential errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// SSID empty, longer than 32 bytes, or containing control characters.
    InvalidSsid,
    /// Secret neither empty (open network) nor 8-64 bytes (WPA2).
    InvalidSecret,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (1-32 bytes, no control characters)"),
            Self::InvalidSecret => write!(f, "password invalid (8-64 bytes for WPA2 or empty)"),
        }
    }
}

impl From<CredentialError> for ProvisioningError {
    fn from(e: CredentialError) -> Self {
        Self::Credentials(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation; the text names the field.
    ValidationFailed(&'static str),
    /// The config document could not be parsed.
    Corrupted(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ProvisioningError>;
