//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes as a relay line. Looks for:
//! - Parser panics
//! - Frames that decode but fail their own validation
//! - Accepted frames that do not survive re-encoding
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealroom_proto::Frame;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    assert!(frame.validate().is_ok(), "decode accepted an invalid frame");

    let encoded = frame.encode().expect("accepted frame must re-encode");
    assert!(!encoded.contains(&b'\n'), "encoded frame breaks line framing");
    assert_eq!(Frame::decode(&encoded).expect("re-encoded frame must decode"), frame);
});
