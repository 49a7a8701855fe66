//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements     | Connects to                          |
//! |------------|----------------|--------------------------------------|
//! | `sim`      | GattTransport  | Scripted in-process ESP32 peripheral |
//! | `log_sink` | EventSink      | `log` output                         |
//! | `store`    | DeviceStore    | In-memory key/value settings         |
//! | `time`     | ClockPort      | `std::time::Instant`                 |

pub mod log_sink;
pub mod sim;
pub mod store;
pub mod time;
