//! Credential / status wire codec.
//!
//! Both directions are compact JSON objects whose field names come from the
//! active [`ProtocolProfile`]:
//!
//! ```text
//!  central ──▶ peripheral   {"ssid":"HomeNet","password":"..."}
//!  peripheral ──▶ central   {"status":"connected","message":"","ip_address":"10.0.0.5"}
//! ```
//!
//! Status decoding never fails.  Missing fields fall back to empty values;
//! a payload that is not a JSON object is classified by keyword.

use core::fmt;

use log::{debug, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::credentials::{CredentialPayload, SecretBytes};
use crate::error::TransmissionError;
use crate::profile::ProtocolProfile;

// ---------------------------------------------------------------------------
// Status vocabulary
// ---------------------------------------------------------------------------

/// Status reported by the peripheral about its own network join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTag {
    /// Joined the network (`connected` or `success`).
    Connected,
    /// Join in progress; poll again.
    Connecting,
    /// Idle and waiting for credentials.
    Ready,
    Failed,
    Error,
    Unknown,
}

impl StatusTag {
    /// Case-insensitive parse of the `status` field.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "connected" | "success" => Self::Connected,
            "connecting" => Self::Connecting,
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Keyword classification of free text.
    ///
    /// Failure keywords win; `disconnected` must not read as `connected`.
    pub fn classify_text(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("fail") || lower.contains("error") {
            Self::Failed
        } else if lower.contains("disconnected") {
            Self::Unknown
        } else if lower.contains("connecting") {
            Self::Connecting
        } else if lower.contains("connected") || lower.contains("success") {
            Self::Connected
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Connected | Self::Failed | Self::Error)
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Decoded report
// ---------------------------------------------------------------------------

/// One decoded status payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: StatusTag,
    /// The `status` field as sent (or the whole text for heuristic reports).
    pub raw_status: String,
    pub message: String,
    pub ip_address: Option<String>,
    pub device_id: Option<String>,
    pub rssi: Option<i32>,
    /// `true` when the payload was not a JSON object and keywords decided.
    pub heuristic: bool,
}

impl StatusReport {
    pub fn new(status: StatusTag) -> Self {
        Self {
            status,
            raw_status: status.as_str().to_owned(),
            message: String::new(),
            ip_address: None,
            device_id: None,
            rssi: None,
            heuristic: false,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Central side
// ---------------------------------------------------------------------------

/// Borrowed credential object.  Serialises straight from the payload.
struct CredentialFields<'a> {
    ssid_key: &'static str,
    secret_key: &'static str,
    payload: &'a CredentialPayload,
}

impl CredentialFields<'_> {
    /// Upper bound on the encoded size: every byte escaped as `\uXXXX`
    /// plus braces, quotes, colons and the comma.
    fn encoded_bound(&self) -> usize {
        let text = self.ssid_key.len()
            + self.secret_key.len()
            + self.payload.ssid().len()
            + self.payload.secret().len();
        6 * text + 16
    }
}

impl Serialize for CredentialFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.ssid_key, self.payload.ssid())?;
        map.serialize_entry(self.secret_key, self.payload.secret())?;
        map.end()
    }
}

/// Serialise credentials for the credential characteristic.
///
/// The buffer is sized up front so it never reallocates, leaving no
/// unwiped copy of the secret behind.
pub fn encode_credentials(
    profile: &ProtocolProfile,
    payload: &CredentialPayload,
) -> Result<SecretBytes, TransmissionError> {
    let fields = CredentialFields {
        ssid_key: profile.fields.ssid,
        secret_key: profile.fields.password,
        payload,
    };
    let mut buf = Zeroizing::new(Vec::with_capacity(fields.encoded_bound()));
    serde_json::to_writer(&mut *buf, &fields).map_err(|_| TransmissionError::EncodeFailed)?;
    Ok(SecretBytes::new(buf))
}

/// Decode a status payload.  Always yields a report.
pub fn decode_status(profile: &ProtocolProfile, bytes: &[u8]) -> StatusReport {
    let text = String::from_utf8_lossy(bytes);
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(obj)) => decode_object(profile, &obj),
        _ => {
            warn!("status payload is not a JSON object, using keyword fallback");
            classify_heuristic(&text)
        }
    }
}

fn decode_object(profile: &ProtocolProfile, obj: &Map<String, Value>) -> StatusReport {
    let f = &profile.fields;
    let raw_status = str_field(obj, f.status).unwrap_or("unknown").to_owned();
    let report = StatusReport {
        status: StatusTag::parse(&raw_status),
        raw_status,
        message: str_field(obj, f.message).unwrap_or_default().to_owned(),
        ip_address: non_empty(obj, f.ip_address),
        device_id: non_empty(obj, f.device_id),
        rssi: obj
            .get(f.rssi)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok()),
        heuristic: false,
    };
    debug!(
        "decoded status '{}' (message '{}', ip {:?})",
        report.raw_status, report.message, report.ip_address
    );
    report
}

fn classify_heuristic(text: &str) -> StatusReport {
    let trimmed = text.trim();
    StatusReport {
        status: StatusTag::classify_text(trimmed),
        raw_status: trimmed.to_owned(),
        message: trimmed.to_owned(),
        ip_address: None,
        device_id: None,
        rssi: None,
        heuristic: true,
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn non_empty(obj: &Map<String, Value>, key: &str) -> Option<String> {
    str_field(obj, key)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Peripheral side (simulator and tests)
// ---------------------------------------------------------------------------

/// Credentials as a conforming peripheral would read them.
#[derive(Clone, PartialEq, Eq)]
pub struct ReceivedCredentials {
    pub ssid: String,
    pub password: String,
}

impl fmt::Debug for ReceivedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parse a credential write.  `None` if it is not a conforming payload.
pub fn decode_credentials(profile: &ProtocolProfile, bytes: &[u8]) -> Option<ReceivedCredentials> {
    let Value::Object(obj) = serde_json::from_slice::<Value>(bytes).ok()? else {
        return None;
    };
    Some(ReceivedCredentials {
        ssid: str_field(&obj, profile.fields.ssid)?.to_owned(),
        password: str_field(&obj, profile.fields.password)
            .unwrap_or_default()
            .to_owned(),
    })
}

/// Serialise a status report the way the peripheral firmware does.
pub fn encode_status(profile: &ProtocolProfile, report: &StatusReport) -> Vec<u8> {
    let f = &profile.fields;
    let mut obj = Map::new();
    obj.insert(f.status.into(), Value::from(report.raw_status.as_str()));
    obj.insert(f.message.into(), Value::from(report.message.as_str()));
    if let Some(ip) = &report.ip_address {
        obj.insert(f.ip_address.into(), Value::from(ip.as_str()));
    }
    if let Some(id) = &report.device_id {
        obj.insert(f.device_id.into(), Value::from(id.as_str()));
    }
    if let Some(rssi) = report.rssi {
        obj.insert(f.rssi.into(), Value::from(rssi));
    }
    Value::Object(obj).to_string().into_bytes()
}
