//! Fuzz target: `codec::decode_status`
//!
//! Feeds arbitrary bytes to the status decoder under both firmware
//! profiles and asserts that it never panics and that the heuristic path
//! never invents an IP address.
//!
//! cargo fuzz run fuzz_status_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use wifiprov::codec::{StatusTag, decode_status};
use wifiprov::profile::ProtocolProfile;

fuzz_target!(|data: &[u8]| {
    for profile in [ProtocolProfile::esp32_minimal(), ProtocolProfile::legacy()] {
        let report = decode_status(&profile, data);
        if report.heuristic {
            assert!(report.ip_address.is_none());
            assert_eq!(report.status, StatusTag::classify_text(&report.raw_status));
        }
    }
});
