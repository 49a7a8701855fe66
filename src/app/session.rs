//! One provisioning session as a pure transition function.
//!
//! ```text
//!   SessionInput ──▶ GattSession::handle ──▶ Vec<Action>
//!                        │
//!                        └─ Fsm + SessionContext (no I/O)
//! ```
//!
//! The session never touches the transport, the clock or the outcome
//! channel.  It describes what should happen as [`Action`]s; the
//! [`ProvisioningSupervisor`](super::supervisor::ProvisioningSupervisor)
//! executes them and feeds the results back as further inputs.  That keeps
//! every protocol decision unit-testable without a radio.

use core::time::Duration;

use log::debug;
use uuid::Uuid;

use super::events::{CharacteristicRef, LinkId, PeripheralId, ProvisioningEvent, SessionId, TransportEvent};
use crate::config::ProvisioningConfig;
use crate::credentials::{CredentialPayload, SecretBytes};
use crate::error::TransportError;
use crate::fsm::context::SessionContext;
use crate::fsm::{Fsm, StateId, states};
use crate::profile::ProtocolProfile;
use crate::timers::TimerKind;

// ───────────────────────────────────────────────────────────────
// Inputs
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    Start,
    /// The transport accepted a connect request and minted this link.
    LinkOpened(LinkId),
    Transport(TransportEvent),
    TimerFired(TimerKind),
    /// The transport refused a request outright.
    Rejected(RequestKind, TransportError),
    Cancel,
}

// ───────────────────────────────────────────────────────────────
// Actions
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Connect,
    DiscoverServices,
    EnableNotifications,
    WriteDescriptor,
    WriteCredentials,
    ReadStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    Connect {
        peripheral: PeripheralId,
    },
    DiscoverServices {
        link: LinkId,
    },
    EnableNotifications {
        link: LinkId,
        characteristic: CharacteristicRef,
    },
    WriteDescriptor {
        link: LinkId,
        characteristic: CharacteristicRef,
        descriptor: Uuid,
        value: [u8; 2],
    },
    WriteCredentials {
        link: LinkId,
        characteristic: CharacteristicRef,
        payload: SecretBytes,
    },
    ReadStatus {
        link: LinkId,
        characteristic: CharacteristicRef,
    },
}

impl TransportRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Connect { .. } => RequestKind::Connect,
            Self::DiscoverServices { .. } => RequestKind::DiscoverServices,
            Self::EnableNotifications { .. } => RequestKind::EnableNotifications,
            Self::WriteDescriptor { .. } => RequestKind::WriteDescriptor,
            Self::WriteCredentials { .. } => RequestKind::WriteCredentials,
            Self::ReadStatus { .. } => RequestKind::ReadStatus,
        }
    }
}

/// A side effect requested by the session.  Executed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Transport(TransportRequest),
    ArmTimer(TimerKind, Duration),
    CancelTimer(TimerKind),
    CancelAllTimers,
    /// Disconnect, then close.
    Release(LinkId),
    Emit(ProvisioningEvent),
}

// ───────────────────────────────────────────────────────────────
// GattSession
// ───────────────────────────────────────────────────────────────

pub struct GattSession {
    id: SessionId,
    fsm: Fsm,
    ctx: SessionContext,
}

impl GattSession {
    pub fn new(
        id: SessionId,
        config: &ProvisioningConfig,
        profile: ProtocolProfile,
        peripheral: PeripheralId,
        credentials: CredentialPayload,
    ) -> Self {
        Self {
            id,
            fsm: Fsm::new(states::build_state_table(), StateId::Idle),
            ctx: SessionContext::new(config, profile, peripheral, credentials),
        }
    }

    /// Apply one input and return the actions it produced.
    ///
    /// Inputs after a terminal state, and timer firings the session did not
    /// arm (or already cancelled), produce nothing.
    pub fn handle(&mut self, input: SessionInput) -> Vec<Action> {
        if self.fsm.current_state().is_terminal() {
            debug!("session {}: terminal, discarding {:?}", self.id, input);
            return Vec::new();
        }
        if let SessionInput::TimerFired(kind) = input {
            if !self.ctx.timer_fired(kind) {
                debug!("session {}: stale timer {}", self.id, kind.name());
                return Vec::new();
            }
        }
        self.fsm.handle(&mut self.ctx, &input);
        self.ctx.take_actions()
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Link the session currently owns.  Events for any other link are stale.
    pub fn link(&self) -> Option<LinkId> {
        self.ctx.link
    }

    pub fn peripheral(&self) -> &PeripheralId {
        &self.ctx.peripheral
    }

    /// Connection retries spent so far.
    pub fn retries(&self) -> u8 {
        self.ctx.retries()
    }

    pub fn notifications_enabled(&self) -> bool {
        self.ctx.notifications_enabled
    }

    /// `true` until the peripheral acknowledges the credential write.
    pub fn holds_credentials(&self) -> bool {
        self.ctx.credentials.is_some()
    }

    pub fn terminal_emitted(&self) -> bool {
        self.ctx.terminal_emitted()
    }
}
