//! Property-based tests for the control protocol parser and environment
//! overlay
//!
//! **Feature: kiln-process, Property 1: Chunking Invariance**
//! **Feature: kiln-process, Property 2: First Value Wins**
//!
//! Property: *For any* byte stream and *any* way of splitting it into reads,
//! the parser SHALL reach the same outcome as when fed the whole stream at
//! once.
//!
//! Property: *For any* sequence of `set_if_missing` calls, each key SHALL keep
//! the first value it was given.

use std::collections::HashMap;
use std::ffi::OsStr;

use kiln_process::{ControlProtocolState, ControlStatus, Environment, CONTROL_PROTOCOL_VERSION};
use proptest::prelude::*;

const CONTROL_ID: &str = "2a";

/// Streams that exercise every parser path
fn control_stream_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(format!("{CONTROL_PROTOCOL_VERSION}\n{CONTROL_ID}\n").into_bytes()),
        Just(format!("{CONTROL_PROTOCOL_VERSION}\n{CONTROL_ID}\ntrailing").into_bytes()),
        "[a-z0-9.]{0,24}".prop_map(|id| format!("{CONTROL_PROTOCOL_VERSION}\n{id}\n").into_bytes()),
        "[a-z0-9.\n]{0,40}".prop_map(String::into_bytes),
        prop::collection::vec(any::<u8>(), 0..64),
    ]
}

/// Split `bytes` at the given (unsorted, possibly repeated) cut points
fn split_at_points(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<&[u8]> {
    cuts.iter_mut().for_each(|cut| *cut %= bytes.len() + 1);
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(&bytes[start..cut]);
        start = cut;
    }
    chunks.push(&bytes[start..]);
    chunks
}

fn feed(chunks: &[&[u8]]) -> (ControlStatus, bool) {
    let mut parser = ControlProtocolState::new(CONTROL_ID);
    let mut status = ControlStatus::Continue;
    for chunk in chunks {
        status = parser.read(chunk);
    }
    (status, parser.should_release())
}

proptest! {
    /// Property 1.1: Any chunking matches the all-at-once outcome
    #[test]
    fn prop_chunking_does_not_change_outcome(
        stream in control_stream_strategy(),
        cuts in prop::collection::vec(any::<usize>(), 0..8),
    ) {
        let whole = feed(&[stream.as_slice()]);
        let chunked = feed(&split_at_points(&stream, cuts));
        prop_assert_eq!(whole, chunked);
    }

    /// Property 1.2: Byte-at-a-time matches the all-at-once outcome
    #[test]
    fn prop_byte_at_a_time_matches(stream in control_stream_strategy()) {
        let bytes: Vec<&[u8]> = stream.chunks(1).collect();
        prop_assert_eq!(feed(&[stream.as_slice()]), feed(&bytes));
    }

    /// Property 1.3: Only the exact handshake releases
    #[test]
    fn prop_release_requires_matching_id(id in "[a-z0-9]{1,16}") {
        let stream = format!("{CONTROL_PROTOCOL_VERSION}\n{id}\n");
        let (status, released) = feed(&[stream.as_bytes()]);
        prop_assert_eq!(released, id == CONTROL_ID);
        prop_assert_eq!(status == ControlStatus::Completed, id == CONTROL_ID);
    }

    /// Property 2.1: set_if_missing keeps the first value per key
    #[test]
    fn prop_first_value_wins(
        pairs in prop::collection::vec(("[A-D]", "[a-z]{0,4}"), 0..20),
    ) {
        let mut env = Environment::new();
        let mut expected: HashMap<String, String> = HashMap::new();
        for (key, value) in &pairs {
            let inserted = env.set_if_missing(key.as_str(), value.as_str());
            let fresh = !expected.contains_key(key);
            prop_assert_eq!(inserted, fresh);
            expected.entry(key.clone()).or_insert_with(|| value.clone());
        }

        prop_assert_eq!(env.len(), expected.len());
        for (key, value) in &expected {
            prop_assert_eq!(env.get(key.as_str()), Some(OsStr::new(value.as_str())));
        }
    }
}
