//! Bounded reconnect policy.
//!
//! A pure decision: given how many connection failures the session has
//! already absorbed and why the latest one happened, either wait and try
//! again or give up.  The bound is absolute; once `attempt` reaches
//! `max_retries` the answer is always [`RetryDecision::GiveUp`].

use core::time::Duration;

use crate::config::{BackoffMode, ProvisioningConfig};
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial * 2^attempt`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before reconnect number `attempt + 1` (0-based `attempt`).
    pub fn delay(&self, attempt: u8) -> Duration {
        match *self {
            Self::Fixed(d) => d,
            Self::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(u32::from(attempt)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_retries: u8, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn from_config(config: &ProvisioningConfig) -> Self {
        let initial = Duration::from_millis(u64::from(config.retry_backoff_ms));
        let backoff = match config.backoff {
            BackoffMode::Fixed => Backoff::Fixed(initial),
            BackoffMode::Exponential => Backoff::Exponential {
                initial,
                max: Duration::from_millis(u64::from(config.max_backoff_ms)),
            },
        };
        Self {
            max_retries: config.max_connect_retries,
            backoff,
        }
    }

    /// `attempt` is the number of retries already spent.
    pub fn decide(&self, attempt: u8, reason: &TransportError) -> RetryDecision {
        if !Self::is_retryable(reason) || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.backoff.delay(attempt))
    }

    /// Missing adapter or handle: reconnecting cannot help.
    pub fn is_retryable(reason: &TransportError) -> bool {
        !matches!(reason, TransportError::Unavailable)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProvisioningConfig::default())
    }
}
