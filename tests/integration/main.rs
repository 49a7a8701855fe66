//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the provisioning core
//! against mock or simulated adapters.  All tests run on the host with no
//! radio required.

mod mock_transport;
mod session_flow_tests;
mod supervisor_tests;
