//! Fuzzes the frame index and sub-frame count payload parsers.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_frame_payload
#![no_main]
use libfuzzer_sys::fuzz_target;
use sensorlog_replay::{parse_frame_index, parse_sub_frame_count};

fuzz_target!(|data: &[u8]| {
    let index = parse_frame_index(data);
    let count = parse_sub_frame_count(data);

    // A sub-frame count is only ever read after a frame index.
    if count.is_some() {
        assert!(index.is_some());
    }
});
