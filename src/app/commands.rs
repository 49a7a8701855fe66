//! Inbound requests to the provisioning supervisor.

use super::events::PeripheralId;

/// Arguments for [`ProvisioningSupervisor::start`](super::supervisor::ProvisioningSupervisor::start).
///
/// Holds the secret only until the supervisor validates it into a
/// [`CredentialPayload`](crate::credentials::CredentialPayload).
#[derive(Clone)]
pub struct ProvisionRequest {
    pub peripheral: PeripheralId,
    pub ssid: String,
    pub secret: String,
}

impl ProvisionRequest {
    pub fn new(
        peripheral: impl Into<String>,
        ssid: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            peripheral: PeripheralId::new(peripheral),
            ssid: ssid.into(),
            secret: secret.into(),
        }
    }
}

impl core::fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProvisionRequest")
            .field("peripheral", &self.peripheral)
            .field("ssid", &self.ssid)
            .field("secret", &"<redacted>")
            .finish()
    }
}
