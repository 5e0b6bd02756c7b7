//! Fuzz target: `LineFramer::feed`
//!
//! Drives arbitrary byte sequences into the line framer and asserts that
//! records are never empty, never exceed the buffer, and never contain a
//! terminator.
//!
//! cargo fuzz run fuzz_line_framer

#![no_main]

use libfuzzer_sys::fuzz_target;
use spectroneph::config::JSON_BUFFER_SIZE;
use spectroneph::rpc::framer::LineFramer;

fuzz_target!(|data: &[u8]| {
    let mut framer = LineFramer::<JSON_BUFFER_SIZE>::new();

    framer.feed_slice(data, |record| {
        assert!(!record.is_empty(), "framer must not yield empty records");
        assert!(record.len() <= JSON_BUFFER_SIZE, "record exceeds buffer");
        assert!(!record.contains(&b'\n'));
    });
    assert!(framer.pending() <= JSON_BUFFER_SIZE);

    // After a reset the framer must accept bytes cleanly again.
    framer.reset();
    assert_eq!(framer.pending(), 0);
    framer.feed_slice(data, |_| {});
});
