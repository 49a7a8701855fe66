//! Network credentials handed to the peripheral.
//!
//! The secret lives in a fixed-capacity buffer that is zeroized on
//! [`CredentialPayload::wipe`] and again on drop.  `Debug` never prints it.

use core::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CredentialError;

pub const MAX_SSID_LEN: usize = 32;
pub const MIN_WPA2_SECRET_LEN: usize = 8;
pub const MAX_SECRET_LEN: usize = 64;

/// Validated SSID + secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPayload {
    ssid: heapless::String<MAX_SSID_LEN>,
    secret: heapless::Vec<u8, MAX_SECRET_LEN>,
}

impl CredentialPayload {
    /// Validate and copy the credentials into fixed buffers.
    ///
    /// SSID: 1-32 bytes, no control characters.  Secret: empty for an open
    /// network, otherwise 8-64 bytes.
    pub fn new(ssid: &str, secret: &str) -> Result<Self, CredentialError> {
        validate_ssid(ssid)?;
        validate_secret(secret)?;

        let mut s = heapless::String::new();
        s.push_str(ssid).map_err(|_| CredentialError::InvalidSsid)?;
        let v = heapless::Vec::from_slice(secret.as_bytes())
            .map_err(|_| CredentialError::InvalidSecret)?;
        Ok(Self { ssid: s, secret: v })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// The secret as text.  Empty once wiped.
    pub fn secret(&self) -> &str {
        core::str::from_utf8(&self.secret).unwrap_or_default()
    }

    pub fn is_open_network(&self) -> bool {
        self.secret.is_empty()
    }

    pub fn is_wiped(&self) -> bool {
        self.secret.is_empty()
    }

    /// Zero and forget the secret.  Safe to call repeatedly.
    pub fn wipe(&mut self) {
        self.zeroize();
    }
}

impl Zeroize for CredentialPayload {
    fn zeroize(&mut self) {
        self.secret.as_mut_slice().zeroize();
        self.secret.clear();
    }
}

impl Drop for CredentialPayload {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for CredentialPayload {}

impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPayload")
            .field("ssid", &self.ssid.as_str())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Encoded credential bytes in flight to the transport.  Zeroized on drop.
///
/// Wraps [`Zeroizing`] only to keep the bytes out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    pub fn new(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes(<{} bytes redacted>)", self.0.len())
    }
}

fn validate_ssid(ssid: &str) -> Result<(), CredentialError> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
        return Err(CredentialError::InvalidSsid);
    }
    if ssid.chars().any(char::is_control) {
        return Err(CredentialError::InvalidSsid);
    }
    Ok(())
}

fn validate_secret(secret: &str) -> Result<(), CredentialError> {
    if secret.is_empty() {
        return Ok(());
    }
    if secret.len() < MIN_WPA2_SECRET_LEN || secret.len() > MAX_SECRET_LEN {
        return Err(CredentialError::InvalidSecret);
    }
    Ok(())
}
