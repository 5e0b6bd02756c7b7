//! Fuzz target: `decode_command` followed by reply encoding.
//!
//! Any record that decodes must be answerable with exactly one
//! `\n`-terminated response line, whatever its command name holds.
//!
//! cargo fuzz run fuzz_command_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use spectroneph::rpc::envelope::{Response, StatusCode, decode_command, encode_line};

fuzz_target!(|data: &[u8]| {
    let Ok(cmd) = decode_command(data) else {
        return;
    };
    assert!(cmd.raw.is_object());

    let reply = Response::error(
        cmd.id,
        StatusCode::InvalidCommand,
        format!("Unknown command: {}", cmd.name),
    );
    let line = encode_line(&reply).expect("responses always encode");
    assert_eq!(line.last(), Some(&b'\n'));
    assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
});
