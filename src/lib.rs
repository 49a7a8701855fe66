//! BLE Wi-Fi provisioning library.
//!
//! Drives one GATT session per peripheral: connect, discover, arm status
//! notifications, write the network credentials, then watch the reported
//! status until the peripheral joins the network or the session gives up.
//! The core never touches a radio; platform stacks plug in through
//! [`app::ports::GattTransport`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fsm;
pub mod outcome;
pub mod profile;
pub mod retry;
pub mod timers;

pub use app::commands::ProvisionRequest;
pub use app::events::{Outcome, PeripheralId, ProvisioningEvent, SessionId};
pub use app::supervisor::ProvisioningSupervisor;
pub use config::ProvisioningConfig;
pub use error::ProvisioningError;
pub use profile::{FirmwareGeneration, ProtocolProfile};
