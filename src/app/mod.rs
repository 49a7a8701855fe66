//! Application core: pure domain logic, zero I/O.
//!
//! The provisioning protocol lives here: the per-session transition
//! function ([`session`]), the supervisor that executes its actions
//! ([`supervisor`]), and the events and commands that cross the boundary.
//! All interaction with the radio happens through the **port traits** in
//! [`ports`], so this layer is fully testable with a scripted peripheral.

pub mod commands;
pub mod events;
pub mod ports;
pub mod session;
pub mod supervisor;
