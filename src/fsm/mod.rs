//! Function-pointer finite state machine engine for a provisioning session.
//!
//! Classic embedded FSM pattern, driven by inputs instead of ticks:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                           │
//! │  ┌───────────────────────┬──────────────────┬─────────┬────────────┐  │
//! │  │ StateId               │ on_enter         │ on_exit │ on_input   │  │
//! │  ├───────────────────────┼──────────────────┼─────────┼────────────┤  │
//! │  │ Idle                  │ -                │ -       │ fn(ctx,in) │  │
//! │  │ Connecting            │ fn(ctx)->Option  │ -       │ fn(ctx,in) │  │
//! │  │ ...                   │                  │         │            │  │
//! │  │ Success/Failed/Errored│ fn(ctx)->Option  │ -       │ fn(ctx,in) │  │
//! │  └───────────────────────┴──────────────────┴─────────┴────────────┘  │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each input is handed to `on_input` of the **current** state.  If it
//! returns `Some(next_id)` (and `next_id` differs from the current state),
//! the engine runs `on_exit` for the current state, then `on_enter` for the
//! next.  An `on_enter` may itself return `Some(next)` for pass-through
//! states such as `CapabilitiesResolving`; the engine follows such chains
//! up to [`StateId::COUNT`] hops.
//!
//! Handlers never perform I/O.  They record [`Action`]s in the
//! [`SessionContext`] which the session hands back to its owner.
//!
//! [`Action`]: crate::app::session::Action

pub mod context;
pub mod states;

use context::SessionContext;
use log::{info, warn};

use crate::app::session::SessionInput;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Every state a provisioning session can be in.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Connecting = 1,
    ServicesDiscovering = 2,
    CapabilitiesResolving = 3,
    NotificationsArming = 4,
    CredentialSending = 5,
    AwaitingSettle = 6,
    StatusPolling = 7,
    Success = 8,
    Failed = 9,
    Errored = 10,
}

impl StateId {
    /// Total number of states.  Sizes the table array.
    pub const COUNT: usize = 11;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Errored` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::ServicesDiscovering,
            3 => Self::CapabilitiesResolving,
            4 => Self::NotificationsArming,
            5 => Self::CredentialSending,
            6 => Self::AwaitingSettle,
            7 => Self::StatusPolling,
            8 => Self::Success,
            9 => Self::Failed,
            10 => Self::Errored,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Errored
            }
        }
    }

    /// No transitions leave a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Errored)
    }

    /// The credential write has been acknowledged in this state.
    pub fn is_post_write(self) -> bool {
        matches!(self, Self::AwaitingSettle | Self::StatusPolling)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter`: runs once on entry.  `Some(next)` continues straight on.
pub type StateEnterFn = fn(&mut SessionContext) -> Option<StateId>;

/// `on_exit`: runs once when leaving.
pub type StateActionFn = fn(&mut SessionContext);

/// Per-input handler.  Returns `Some(next)` to transition, `None` to stay.
pub type StateInputFn = fn(&mut SessionContext, &SessionInput) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single session state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateEnterFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_input: StateInputFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The session state machine engine.
///
/// Owns the state table and the current pointer; the mutable
/// [`SessionContext`] is threaded through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Inputs handled since construction.
    input_count: u64,
    /// Value of `input_count` when the current state was entered.
    state_entry_input: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            input_count: 0,
            state_entry_input: 0,
        }
    }

    /// Deliver one input to the current state and follow any transition.
    pub fn handle(&mut self, ctx: &mut SessionContext, input: &SessionInput) {
        self.input_count += 1;

        let next = (self.table[self.current].on_input)(ctx, input);

        if let Some(next_id) = next {
            if next_id as usize != self.current {
                self.transition(next_id, ctx);
            }
        }
    }

    /// Jump straight to `next`, running exit/enter handlers.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut SessionContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn current_name(&self) -> &'static str {
        self.table[self.current].name
    }

    /// How many inputs the current state has handled.
    pub fn inputs_in_current_state(&self) -> u64 {
        self.input_count - self.state_entry_input
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, first: StateId, ctx: &mut SessionContext) {
        let mut next = Some(first);
        let mut hops = 0;

        while let Some(next_id) = next {
            hops += 1;
            if hops > StateId::COUNT {
                warn!(
                    "FSM: pass-through chain did not settle, stopping in {}",
                    self.table[self.current].name
                );
                break;
            }

            let next_idx = next_id as usize;
            info!(
                "session: {} -> {}",
                self.table[self.current].name, self.table[next_idx].name
            );

            if let Some(exit) = self.table[self.current].on_exit {
                exit(ctx);
            }

            self.current = next_idx;
            self.state_entry_input = self.input_count;

            next = self.table[self.current]
                .on_enter
                .and_then(|enter| enter(ctx))
                .filter(|n| *n as usize != self.current);
        }
    }
}
