//! Named one-shot timeouts for a provisioning session.
//!
//! ```text
//!  arm(kind, now, delay) ──▶ slots[kind] = now + delay   (replaces)
//!  cancel(kind)          ──▶ slots[kind] = None
//!  pop_due(now)          ──▶ earliest slot with deadline <= now, cleared
//! ```
//!
//! Exactly one pending deadline per [`TimerKind`], so re-arming after a
//! retry can never produce a duplicate firing.  The table is a fixed array
//! indexed by kind; no heap, no sorting.

use core::time::Duration;

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimerKind {
    /// Connect attempt must complete before this fires.
    ConnectTimeout = 0,
    /// Wait before the next connect attempt.
    ConnectBackoff = 1,
    /// Post-connect delay before service discovery.
    DiscoverySettle = 2,
    /// Post-notification-arming delay before the credential write.
    CredentialSettle = 3,
    /// Post-write delay before the first status read.
    StatusSettle = 4,
    /// Re-read while the peripheral reports `connecting`.
    StatusPoll = 5,
    /// Optimistic completion after the credential write.
    CompletionAssumed = 6,
}

impl TimerKind {
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::ConnectTimeout,
        Self::ConnectBackoff,
        Self::DiscoverySettle,
        Self::CredentialSettle,
        Self::StatusSettle,
        Self::StatusPoll,
        Self::CompletionAssumed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ConnectTimeout => "connect-timeout",
            Self::ConnectBackoff => "connect-backoff",
            Self::DiscoverySettle => "discovery-settle",
            Self::CredentialSettle => "credential-settle",
            Self::StatusSettle => "status-settle",
            Self::StatusPoll => "status-poll",
            Self::CompletionAssumed => "completion-assumed",
        }
    }
}

/// Deadline table.  Times are milliseconds on the caller's monotonic clock.
#[derive(Debug, Clone, Default)]
pub struct TimeoutScheduler {
    slots: [Option<u64>; TimerKind::COUNT],
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire `delay` after `now_ms`, replacing any pending one.
    pub fn arm(&mut self, kind: TimerKind, now_ms: u64, delay: Duration) {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let deadline = now_ms.saturating_add(delay_ms);
        if self.slots[kind as usize].replace(deadline).is_some() {
            debug!("timer {} re-armed, deadline {}ms", kind.name(), deadline);
        }
    }

    /// Returns `true` if a pending timer was removed.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        self.slots[kind as usize].take().is_some()
    }

    pub fn cancel_all(&mut self) {
        self.slots = [None; TimerKind::COUNT];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind as usize].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.slots[kind as usize]
    }

    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.slots.iter().flatten().copied().min()
    }

    /// Remove and return the earliest timer whose deadline has passed.
    /// Ties go to the lower kind index.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerKind> {
        let (idx, _) = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|d| (i, d)))
            .filter(|&(_, d)| d <= now_ms)
            .min_by_key(|&(i, d)| (d, i))?;
        self.slots[idx] = None;
        Some(TimerKind::ALL[idx])
    }
}
