//! Provisioning configuration parameters
//!
//! All tunable timings and bounds for a provisioning session.
//! Values can be overridden from a JSON document (see `wifiprov-sim --config`).

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::profile::FirmwareGeneration;

/// Backoff shape between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffMode {
    /// Wait `retry_backoff_ms` before every reconnect.
    Fixed,
    /// Double the wait after each failure, capped at `max_backoff_ms`.
    Exponential,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    // --- Protocol ---
    /// Which firmware generation's identifiers and field names to use.
    pub firmware: FirmwareGeneration,

    // --- Connection ---
    /// Reconnect attempts after the first failed connect.
    pub max_connect_retries: u8,
    /// Connect attempt must complete within this window.
    pub connect_timeout_ms: u32,
    /// Delay before a reconnect attempt.
    pub retry_backoff_ms: u32,
    pub backoff: BackoffMode,
    /// Ceiling for exponential backoff.
    pub max_backoff_ms: u32,

    // --- Settle delays ---
    /// After connect, before service discovery.
    pub discovery_settle_ms: u32,
    /// After enabling notifications, before the credential write.
    pub notification_settle_ms: u32,
    /// After the credential write, before the first status read.
    pub status_settle_ms: u32,

    // --- Status observation ---
    /// Re-read interval while the peripheral reports `connecting`.
    pub status_poll_interval_ms: u32,
    /// No definitive status within this window after the write → assume success.
    pub completion_assumed_ms: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            firmware: FirmwareGeneration::Minimal,

            max_connect_retries: 3,
            connect_timeout_ms: 15_000,
            retry_backoff_ms: 2_000,
            backoff: BackoffMode::Fixed,
            max_backoff_ms: 30_000,

            discovery_settle_ms: 1_000,
            notification_settle_ms: 500,
            status_settle_ms: 3_000,

            status_poll_interval_ms: 3_000,
            completion_assumed_ms: 10_000,
        }
    }
}

impl ProvisioningConfig {
    /// Reject values that would stall or spin a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connect_retries > 10 {
            return Err(ConfigError::ValidationFailed("max_connect_retries must be <= 10"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("connect_timeout_ms must be > 0"));
        }
        if self.status_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("status_poll_interval_ms must be > 0"));
        }
        if self.completion_assumed_ms == 0 {
            return Err(ConfigError::ValidationFailed("completion_assumed_ms must be > 0"));
        }
        if self.backoff == BackoffMode::Exponential && self.max_backoff_ms < self.retry_backoff_ms
        {
            return Err(ConfigError::ValidationFailed(
                "max_backoff_ms must be >= retry_backoff_ms",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        ms(self.connect_timeout_ms)
    }

    pub fn discovery_settle(&self) -> Duration {
        ms(self.discovery_settle_ms)
    }

    pub fn notification_settle(&self) -> Duration {
        ms(self.notification_settle_ms)
    }

    pub fn status_settle(&self) -> Duration {
        ms(self.status_settle_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        ms(self.status_poll_interval_ms)
    }

    pub fn completion_assumed(&self) -> Duration {
        ms(self.completion_assumed_ms)
    }
}

fn ms(v: u32) -> Duration {
    Duration::from_millis(u64::from(v))
}
