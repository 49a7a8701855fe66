//! Provisioning supervisor: the hexagonal core's public façade.
//!
//! [`ProvisioningSupervisor`] owns at most one active [`GattSession`] and
//! that session's [`TimeoutScheduler`].  It executes the session's
//! [`Action`]s against a transport injected at each call site, feeds
//! completions and timer firings back in, and republishes every
//! [`ProvisioningEvent`] on the outcome stream.
//!
//! ```text
//!  GattTransport ◀──┐ ┌────────────────────────────┐
//!                   └─│  ProvisioningSupervisor    │──▶ OutcomeStream
//!  TransportEvent ───▶│  GattSession · Timers      │
//!  tick(now) ────────▶└────────────────────────────┘
//! ```
//!
//! Everything runs on the caller's thread, one input at a time.  Nothing
//! here blocks: completions arrive later through
//! [`on_transport_event`](ProvisioningSupervisor::on_transport_event) and
//! deadlines are driven by [`tick`](ProvisioningSupervisor::tick).

use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::config::ProvisioningConfig;
use crate::credentials::CredentialPayload;
use crate::error::{ConfigError, ProvisioningError, TransportError};
use crate::fsm::StateId;
use crate::outcome::{OutcomeSender, OutcomeStream, outcome_channel};
use crate::profile::ProtocolProfile;
use crate::timers::TimeoutScheduler;

use super::commands::ProvisionRequest;
use super::events::{LinkId, Outcome, ProvisioningEvent, SessionId, TransportEvent};
use super::ports::GattTransport;
use super::session::{Action, GattSession, SessionInput, TransportRequest};

// ───────────────────────────────────────────────────────────────
// Active session bookkeeping
// ───────────────────────────────────────────────────────────────

struct ActiveSession {
    session: GattSession,
    timers: TimeoutScheduler,
}

// ───────────────────────────────────────────────────────────────
// ProvisioningSupervisor
// ───────────────────────────────────────────────────────────────

pub struct ProvisioningSupervisor {
    config: ProvisioningConfig,
    profile: ProtocolProfile,
    active: Option<ActiveSession>,
    /// Identity and final state of the most recently finished session.
    last_finished: Option<(SessionId, StateId)>,
    next_session: u32,
    sender: OutcomeSender,
    stream: OutcomeStream,
}

impl ProvisioningSupervisor {
    /// Validate `config` and build a supervisor for its firmware generation.
    pub fn new(config: ProvisioningConfig) -> Result<Self, ConfigError> {
        let profile = ProtocolProfile::for_generation(config.firmware);
        Self::with_profile(config, profile)
    }

    /// Use a custom protocol profile instead of the generation default.
    pub fn with_profile(
        config: ProvisioningConfig,
        profile: ProtocolProfile,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sender, stream) = outcome_channel();
        info!(
            "supervisor ready (firmware {}, service {})",
            profile.generation.name(),
            profile.service
        );
        Ok(Self {
            config,
            profile,
            active: None,
            last_finished: None,
            next_session: 1,
            sender,
            stream,
        })
    }

    /// A handle on the outcome stream.  Clones share one queue.
    pub fn outcomes(&self) -> OutcomeStream {
        self.stream.clone()
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub fn profile(&self) -> &ProtocolProfile {
        &self.profile
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Begin provisioning `request.peripheral`.
    ///
    /// Credentials are validated first; on failure nothing is touched and
    /// no session is created.  An already active session is cancelled
    /// (and reports its own `Failed`) before the new one connects.
    pub fn start(
        &mut self,
        transport: &mut impl GattTransport,
        now_ms: u64,
        request: ProvisionRequest,
    ) -> Result<SessionId, ProvisioningError> {
        let credentials = CredentialPayload::new(&request.ssid, &request.secret)?;

        if let Some(prev) = self.active_session() {
            info!("session {prev} superseded by a new start");
            self.feed(transport, now_ms, SessionInput::Cancel);
        }

        let id = SessionId(self.next_session);
        self.next_session = self.next_session.wrapping_add(1);

        let session = GattSession::new(
            id,
            &self.config,
            self.profile,
            request.peripheral,
            credentials,
        );
        self.active = Some(ActiveSession {
            session,
            timers: TimeoutScheduler::new(),
        });
        self.feed(transport, now_ms, SessionInput::Start);
        Ok(id)
    }

    /// Cancel `session` if it is the active one.
    pub fn cancel(
        &mut self,
        transport: &mut impl GattTransport,
        now_ms: u64,
        session: SessionId,
    ) -> bool {
        if self.active_session() != Some(session) {
            debug!("cancel for inactive session {session} ignored");
            return false;
        }
        self.feed(transport, now_ms, SessionInput::Cancel);
        true
    }

    /// Release whatever the active session holds.  Safe to call repeatedly.
    pub fn teardown(&mut self, transport: &mut impl GattTransport, now_ms: u64) {
        if self.active.is_some() {
            self.feed(transport, now_ms, SessionInput::Cancel);
        }
    }

    // ── Inputs ────────────────────────────────────────────────

    /// Deliver a transport completion.  Events for any link other than the
    /// active session's current one are stale and dropped.
    pub fn on_transport_event(
        &mut self,
        transport: &mut impl GattTransport,
        now_ms: u64,
        link: LinkId,
        event: TransportEvent,
    ) {
        let current = self.active.as_ref().and_then(|a| a.session.link());
        if current != Some(link) {
            debug!("dropping {event:?} for stale link {link:?}");
            return;
        }
        self.feed(transport, now_ms, SessionInput::Transport(event));
    }

    /// Fire every timer due at `now_ms`, earliest first, one at a time.
    pub fn tick(&mut self, transport: &mut impl GattTransport, now_ms: u64) {
        loop {
            let Some(active) = self.active.as_mut() else {
                return;
            };
            let Some(kind) = active.timers.pop_due(now_ms) else {
                return;
            };
            debug!("timer {} fired at {now_ms}ms", kind.name());
            self.feed(transport, now_ms, SessionInput::TimerFired(kind));
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Earliest pending deadline of the active session.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.active.as_ref().and_then(|a| a.timers.next_deadline())
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.session.id())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// State of `session` if it is active or was the last one to finish.
    pub fn session_state(&self, session: SessionId) -> Option<StateId> {
        match (&self.active, self.last_finished) {
            (Some(a), _) if a.session.id() == session => Some(a.session.state()),
            (_, Some((id, state))) if id == session => Some(state),
            _ => None,
        }
    }

    /// Link held by the active session.
    pub fn active_link(&self) -> Option<LinkId> {
        self.active.as_ref().and_then(|a| a.session.link())
    }

    // ── Internal ──────────────────────────────────────────────

    /// Run `input` and every input it causes through the active session.
    fn feed(&mut self, transport: &mut impl GattTransport, now_ms: u64, input: SessionInput) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let Some(active) = self.active.as_mut() else {
                return;
            };
            let actions = active.session.handle(input);
            let id = active.session.id();
            execute(active, &self.sender, transport, now_ms, id, actions, &mut queue);

            if active.session.is_terminal() {
                let state = active.session.state();
                info!("session {id} finished in {state:?}");
                self.last_finished = Some((id, state));
                self.active = None;
                if !queue.is_empty() {
                    debug!("dropping {} input(s) queued behind a terminal state", queue.len());
                }
                return;
            }
        }
    }
}

/// Execute one batch in order.
///
/// A link minted by a connect is queued back as `LinkOpened`.  The first
/// rejected request is queued back as `Rejected` and the rest of the batch
/// is discarded.
fn execute(
    active: &mut ActiveSession,
    sender: &OutcomeSender,
    transport: &mut impl GattTransport,
    now_ms: u64,
    session: SessionId,
    actions: Vec<Action>,
    feedback: &mut VecDeque<SessionInput>,
) {
    for action in actions {
        match action {
            Action::Transport(request) => {
                let kind = request.kind();
                match dispatch(transport, request) {
                    Ok(Some(link)) => feedback.push_back(SessionInput::LinkOpened(link)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("{kind:?} rejected by transport: {e}");
                        feedback.push_back(SessionInput::Rejected(kind, e));
                        return;
                    }
                }
            }
            Action::ArmTimer(kind, delay) => active.timers.arm(kind, now_ms, delay),
            Action::CancelTimer(kind) => {
                active.timers.cancel(kind);
            }
            Action::CancelAllTimers => active.timers.cancel_all(),
            Action::Release(link) => {
                debug!("releasing link {link:?}");
                transport.disconnect(link);
                transport.close(link);
            }
            Action::Emit(event) => publish(sender, session, event),
        }
    }
}

fn dispatch(
    transport: &mut impl GattTransport,
    request: TransportRequest,
) -> Result<Option<LinkId>, TransportError> {
    match request {
        TransportRequest::Connect { peripheral } => transport.connect(&peripheral).map(Some),
        TransportRequest::DiscoverServices { link } => {
            transport.discover_services(link).map(|()| None)
        }
        TransportRequest::EnableNotifications {
            link,
            characteristic,
        } => transport
            .set_notifications(link, &characteristic, true)
            .map(|()| None),
        TransportRequest::WriteDescriptor {
            link,
            characteristic,
            descriptor,
            value,
        } => transport
            .write_descriptor(link, &characteristic, descriptor, &value)
            .map(|()| None),
        TransportRequest::WriteCredentials {
            link,
            characteristic,
            payload,
        } => {
            // `payload` is zeroed when it drops at the end of this arm.
            transport
                .write_characteristic(link, &characteristic, payload.as_slice())
                .map(|()| None)
        }
        TransportRequest::ReadStatus {
            link,
            characteristic,
        } => transport
            .read_characteristic(link, &characteristic)
            .map(|()| None),
    }
}

fn publish(sender: &OutcomeSender, session: SessionId, event: ProvisioningEvent) {
    match &event {
        ProvisioningEvent::Progress(text) => debug!("session {session}: {text}"),
        ProvisioningEvent::Failed(e) | ProvisioningEvent::Error(e) => {
            warn!("session {session}: {} ({})", e, e.category());
        }
        other => info!("session {session}: {other:?}"),
    }
    sender.publish(Outcome { session, event });
}
