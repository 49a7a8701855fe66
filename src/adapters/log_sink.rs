//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one line per outcome to the `log`
//! facade.  A UI adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::{Outcome, ProvisioningEvent};
use crate::app::ports::EventSink;

/// Adapter that logs every [`Outcome`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: usize,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes seen so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, outcome: &Outcome) {
        self.emitted += 1;
        let session = outcome.session;
        match &outcome.event {
            ProvisioningEvent::Started => info!("START | session={session}"),
            ProvisioningEvent::Connected => info!("LINK  | session={session} connected"),
            ProvisioningEvent::Disconnected => info!("LINK  | session={session} disconnected"),
            ProvisioningEvent::Progress(text) => {
                for line in text.lines() {
                    info!("PROG  | session={session} | {line}");
                }
            }
            ProvisioningEvent::Success(device) => info!(
                "DONE  | session={session} | peripheral={} ip={} device={}",
                device.peripheral,
                device.ip_address.as_deref().unwrap_or("-"),
                device.device_id.as_deref().unwrap_or("-"),
            ),
            ProvisioningEvent::Failed(e) => {
                warn!("FAIL  | session={session} | {} | {e}", e.category());
            }
            ProvisioningEvent::Error(e) => {
                warn!("ERROR | session={session} | {} | {e}", e.category());
            }
        }
    }
}
