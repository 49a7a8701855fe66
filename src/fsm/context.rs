//! Shared mutable context threaded through every session state handler.
//!
//! `SessionContext` is the blackboard the handlers read from and write to:
//! the session's configuration and protocol profile, the peripheral and its
//! credentials, the current link, resolved capabilities, retry bookkeeping,
//! and the [`Action`] list that the owner executes after each input.
//!
//! The context also mirrors which timers it has asked to be armed, so a
//! firing that was already cancelled (or never armed) is recognised as
//! stale and dropped before it reaches a handler.

use core::time::Duration;

use log::debug;

use crate::app::events::{
    CharacteristicRef, GattService, LinkId, PeripheralId, ProvisionedDevice, ProvisioningEvent,
};
use crate::app::session::{Action, TransportRequest};
use crate::config::ProvisioningConfig;
use crate::credentials::CredentialPayload;
use crate::error::ProvisioningError;
use crate::profile::ProtocolProfile;
use crate::retry::RetryPolicy;
use crate::timers::TimerKind;

use super::StateId;

/// Capabilities located on the peripheral after discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub credential: Option<CharacteristicRef>,
    pub status: Option<CharacteristicRef>,
    /// Status characteristic carries a CCCD.
    pub status_notify_descriptor: bool,
    pub auxiliary: Option<CharacteristicRef>,
}

/// The shared context passed to every state handler function.
pub struct SessionContext {
    // -- Configuration --
    pub config: ProvisioningConfig,
    pub profile: ProtocolProfile,
    pub retry: RetryPolicy,

    // -- Session identity --
    pub peripheral: PeripheralId,
    /// Dropped (and wiped) once the peripheral acknowledges the write.
    pub credentials: Option<CredentialPayload>,

    // -- Link --
    pub link: Option<LinkId>,
    /// The current link has reported `Connected`.
    pub link_up: bool,
    /// Retries spent; never reset within a session.
    retries: u8,
    /// A reconnect is waiting on `ConnectBackoff`.
    pub backoff_pending: bool,

    // -- Discovery --
    pub services: Vec<GattService>,
    pub capabilities: Capabilities,
    pub notifications_enabled: bool,

    // -- Status observation --
    pub status_reads: u32,

    // -- Timers / outcome --
    armed: [bool; TimerKind::COUNT],
    /// Terminal event waiting for the terminal state's `on_enter`.
    pending_terminal: Option<ProvisioningEvent>,
    terminal_emitted: bool,

    actions: Vec<Action>,
}

impl SessionContext {
    pub fn new(
        config: &ProvisioningConfig,
        profile: ProtocolProfile,
        peripheral: PeripheralId,
        credentials: CredentialPayload,
    ) -> Self {
        Self {
            config: config.clone(),
            profile,
            retry: RetryPolicy::from_config(config),
            peripheral,
            credentials: Some(credentials),
            link: None,
            link_up: false,
            retries: 0,
            backoff_pending: false,
            services: Vec::new(),
            capabilities: Capabilities::default(),
            notifications_enabled: false,
            status_reads: 0,
            armed: [false; TimerKind::COUNT],
            pending_terminal: None,
            terminal_emitted: false,
            actions: Vec::new(),
        }
    }

    /// Hand the accumulated actions to the caller.
    pub fn take_actions(&mut self) -> Vec<Action> {
        core::mem::take(&mut self.actions)
    }

    pub fn retries(&self) -> u8 {
        self.retries
    }

    pub(super) fn spend_retry(&mut self) -> u8 {
        self.retries = self.retries.saturating_add(1);
        self.retries
    }

    pub fn terminal_emitted(&self) -> bool {
        self.terminal_emitted
    }

    // -- Timers --

    pub fn arm(&mut self, kind: TimerKind, delay: Duration) {
        self.armed[kind as usize] = true;
        self.actions.push(Action::ArmTimer(kind, delay));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if core::mem::replace(&mut self.armed[kind as usize], false) {
            self.actions.push(Action::CancelTimer(kind));
        }
    }

    pub fn cancel_all(&mut self) {
        self.armed = [false; TimerKind::COUNT];
        self.actions.push(Action::CancelAllTimers);
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed[kind as usize]
    }

    /// Record that `kind` fired.  `false` if it was not armed (stale).
    pub fn timer_fired(&mut self, kind: TimerKind) -> bool {
        core::mem::replace(&mut self.armed[kind as usize], false)
    }

    // -- Transport --

    /// Queue a transport request.  If the transport rejects it, every action
    /// queued after it in this batch is discarded, so emit before requesting.
    pub fn request(&mut self, request: TransportRequest) {
        self.actions.push(Action::Transport(request));
    }

    /// Issue a request that needs the current link.  `false` if there is none.
    pub fn request_on_link(&mut self, build: impl FnOnce(LinkId) -> TransportRequest) -> bool {
        match self.link {
            Some(link) => {
                self.request(build(link));
                true
            }
            None => {
                debug!("no link, request skipped");
                false
            }
        }
    }

    /// Disconnect and close the current link, if any.  Idempotent.
    pub fn release(&mut self) {
        self.link_up = false;
        if let Some(link) = self.link.take() {
            self.actions.push(Action::Release(link));
        }
    }

    // -- Events --

    pub fn emit(&mut self, event: ProvisioningEvent) {
        self.actions.push(Action::Emit(event));
    }

    pub fn progress(&mut self, text: impl Into<String>) {
        self.emit(ProvisioningEvent::Progress(text.into()));
    }

    // -- Terminal outcomes --

    pub fn succeed(&mut self, ip_address: Option<String>, device_id: Option<String>) -> Option<StateId> {
        self.pending_terminal = Some(ProvisioningEvent::Success(ProvisionedDevice {
            peripheral: self.peripheral.clone(),
            ip_address,
            device_id,
        }));
        Some(StateId::Success)
    }

    pub fn fail(&mut self, error: impl Into<ProvisioningError>) -> Option<StateId> {
        self.pending_terminal = Some(ProvisioningEvent::Failed(error.into()));
        Some(StateId::Failed)
    }

    pub fn error(&mut self, error: impl Into<ProvisioningError>) -> Option<StateId> {
        self.pending_terminal = Some(ProvisioningEvent::Error(error.into()));
        Some(StateId::Errored)
    }

    /// Emit the pending terminal event, at most once per session.
    pub(super) fn emit_terminal(&mut self, fallback: impl FnOnce() -> ProvisioningEvent) {
        if self.terminal_emitted {
            return;
        }
        self.terminal_emitted = true;
        let event = self.pending_terminal.take().unwrap_or_else(fallback);
        self.emit(event);
    }
}
