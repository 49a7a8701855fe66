//! Per-firmware-generation protocol identifiers.
//!
//! The session logic is shared across peripheral firmware generations;
//! only the GATT identifiers and the JSON field names differ.  A
//! [`ProtocolProfile`] value carries those so nothing else in the crate
//! hard-codes a UUID.
//!
//! ```text
//!  generation │ service  │ credential │ status   │ auxiliary │ ip field
//! ────────────┼──────────┼────────────┼──────────┼───────────┼──────────
//!  Minimal    │ ffff     │ ff51       │ ff52     │ -         │ ip_address
//!  Legacy     │ aadb     │ aadc       │ aadd     │ aadf      │ ip
//! ```
//!
//! All identifiers live in the Bluetooth base UUID range
//! (`0000xxxx-0000-1000-8000-00805f9b34fb`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Expand a 16-bit assigned number into the Bluetooth base UUID.
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

/// Client Characteristic Configuration Descriptor.
pub const CCCD_UUID: Uuid = short_uuid(0x2902);

/// CCCD value that turns on notifications.
pub const ENABLE_NOTIFICATION: [u8; 2] = [0x01, 0x00];

/// Firmware generation selector (config-file friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareGeneration {
    /// Current ESP32 provisioning firmware.
    #[default]
    Minimal,
    /// Earlier monitor firmware with a separate temperature characteristic.
    Legacy,
}

impl FirmwareGeneration {
    pub fn name(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Legacy => "legacy",
        }
    }
}

/// JSON field names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldNames {
    pub ssid: &'static str,
    pub password: &'static str,
    pub status: &'static str,
    pub message: &'static str,
    pub ip_address: &'static str,
    pub device_id: &'static str,
    pub rssi: &'static str,
}

/// Everything about the peripheral's GATT surface that varies by firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolProfile {
    pub generation: FirmwareGeneration,
    pub service: Uuid,
    /// Write-only credential characteristic.
    pub credential_char: Uuid,
    /// Read/notify status characteristic.
    pub status_char: Uuid,
    /// Optional extra characteristic (located and logged, never required).
    pub auxiliary_char: Option<Uuid>,
    pub cccd: Uuid,
    pub fields: FieldNames,
}

impl ProtocolProfile {
    pub const fn esp32_minimal() -> Self {
        Self {
            generation: FirmwareGeneration::Minimal,
            service: short_uuid(0xffff),
            credential_char: short_uuid(0xff51),
            status_char: short_uuid(0xff52),
            auxiliary_char: None,
            cccd: CCCD_UUID,
            fields: FieldNames {
                ssid: "ssid",
                password: "password",
                status: "status",
                message: "message",
                ip_address: "ip_address",
                device_id: "device_id",
                rssi: "rssi",
            },
        }
    }

    pub const fn legacy() -> Self {
        Self {
            generation: FirmwareGeneration::Legacy,
            service: short_uuid(0xaadb),
            credential_char: short_uuid(0xaadc),
            status_char: short_uuid(0xaadd),
            auxiliary_char: Some(short_uuid(0xaadf)),
            cccd: CCCD_UUID,
            fields: FieldNames {
                ssid: "ssid",
                password: "password",
                status: "status",
                message: "message",
                ip_address: "ip",
                device_id: "device_id",
                rssi: "rssi",
            },
        }
    }

    pub const fn for_generation(generation: FirmwareGeneration) -> Self {
        match generation {
            FirmwareGeneration::Minimal => Self::esp32_minimal(),
            FirmwareGeneration::Legacy => Self::legacy(),
        }
    }
}
