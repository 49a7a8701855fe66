//! Caller-facing outcome channel.
//!
//! Uses an `embassy-sync` bounded channel to bridge the synchronous
//! supervisor with whatever consumes outcomes (a UI task, an async
//! executor, or a plain loop calling [`OutcomeStream::try_next`]).
//!
//! ```text
//! ┌──────────────┐   Outcome    ┌──────────────┐
//! │  Supervisor  │─────────────▶│    Caller    │
//! │  (sync)      │  depth 32    │ (sync/async) │
//! └──────────────┘              └──────────────┘
//! ```
//!
//! Overflow policy is drop-oldest over non-terminal events only.  When the
//! queue holds nothing but terminal events, further terminals wait in an
//! unbounded overflow list behind it, so every session's terminal event is
//! delivered.

use core::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::warn;

use crate::app::events::Outcome;

/// Channel depth for outcome events.
pub const OUTCOME_DEPTH: usize = 32;

type OutcomeChannel = Channel<CriticalSectionRawMutex, Outcome, OUTCOME_DEPTH>;

struct Shared {
    channel: OutcomeChannel,
    /// Terminal events that did not fit.  Always newer than anything in
    /// `channel`; non-empty only while `channel` is full.
    overflow: Mutex<CriticalSectionRawMutex, RefCell<VecDeque<Outcome>>>,
}

impl Shared {
    fn overflow_len(&self) -> usize {
        self.overflow.lock(|o| o.borrow().len())
    }

    fn take_overflow(&self) -> VecDeque<Outcome> {
        self.overflow.lock(|o| core::mem::take(&mut *o.borrow_mut()))
    }

    fn pop_overflow(&self) -> Option<Outcome> {
        self.overflow.lock(|o| o.borrow_mut().pop_front())
    }
}

/// Producer half, held by the supervisor.
#[derive(Clone)]
pub struct OutcomeSender {
    shared: Arc<Shared>,
}

/// Consumer half.  Clones share one queue; each outcome is delivered once.
#[derive(Clone)]
pub struct OutcomeStream {
    shared: Arc<Shared>,
}

/// Create a connected sender/stream pair.
pub fn outcome_channel() -> (OutcomeSender, OutcomeStream) {
    let shared = Arc::new(Shared {
        channel: Channel::new(),
        overflow: Mutex::new(RefCell::new(VecDeque::new())),
    });
    (
        OutcomeSender {
            shared: Arc::clone(&shared),
        },
        OutcomeStream { shared },
    )
}

impl OutcomeSender {
    /// Enqueue without blocking, evicting an old non-terminal event if the
    /// queue is full.
    pub fn publish(&self, outcome: Outcome) {
        let shared = &*self.shared;
        let outcome = if shared.overflow_len() == 0 {
            match shared.channel.try_send(outcome) {
                Ok(()) => return,
                Err(TrySendError::Full(o)) => o,
            }
        } else {
            outcome
        };

        // Rebuild the whole queue in order: channel, overflow, new event.
        let mut queued = Vec::with_capacity(OUTCOME_DEPTH + 1);
        while let Ok(o) = shared.channel.try_receive() {
            queued.push(o);
        }
        queued.extend(shared.take_overflow());
        queued.push(outcome);

        while queued.len() > OUTCOME_DEPTH {
            let Some(victim) = queued.iter().position(|o| !o.event.is_terminal()) else {
                break;
            };
            let dropped = queued.remove(victim);
            warn!(
                "outcome queue full, dropped {:?} for session {}",
                dropped.event, dropped.session
            );
        }

        let mut spill = VecDeque::new();
        for o in queued {
            if !spill.is_empty() {
                spill.push_back(o);
            } else if let Err(TrySendError::Full(o)) = shared.channel.try_send(o) {
                spill.push_back(o);
            }
        }
        if !spill.is_empty() {
            warn!(
                "outcome queue holds only terminal events, {} waiting beyond capacity",
                spill.len()
            );
            shared.overflow.lock(|o| o.borrow_mut().extend(spill));
        }
    }
}

impl OutcomeStream {
    /// Next queued outcome, if any.
    pub fn try_next(&self) -> Option<Outcome> {
        match self.shared.channel.try_receive() {
            Ok(o) => Some(o),
            Err(_) => self.shared.pop_overflow(),
        }
    }

    /// Wait for the next outcome.
    pub async fn next(&self) -> Outcome {
        if let Some(o) = self.try_next() {
            return o;
        }
        self.shared.channel.receive().await
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&self) -> Vec<Outcome> {
        let mut out = Vec::new();
        while let Some(o) = self.try_next() {
            out.push(o);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.shared.channel.len() + self.shared.overflow_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
