//! Fuzzes the `<seconds>.<milliseconds>` log line prefix parser.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_timestamp_prefix
#![no_main]
use libfuzzer_sys::fuzz_target;
use sensorlog_replay::timestamp::{Timestamp, parse_prefix};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must be rejected or parsed, never panic.
    if let Some((ts, payload)) = parse_prefix(data) {
        assert!(payload <= data.len());
        assert!((0..1000).contains(&ts.milliseconds()));

        // Display output must parse back to the same value.
        let shown = ts.to_string();
        assert_eq!(shown.parse::<Timestamp>().ok(), Some(ts));
    }
});
