//! Fuzz target for hostile JSON on the relay connection
//!
//! Harden frame decoding against a malicious relay or peer.
//!
//! # Strategy
//!
//! - Deeply nested: arrays/objects nested inside the data field (recursion)
//! - Huge arrays: ciphertext arrays with very many elements (memory)
//! - Out-of-range bytes: byte arrays holding values above 255 or negative
//! - Wrong IV length: IV arrays that are not 12 elements
//! - Type confusion: a dm-envelope payload under the room-envelope event
//! - Duplicate keys: repeated field names in the data object
//!
//! # Invariants
//!
//! - Decoding completes (serde_json recursion limit holds)
//! - Oversized lines are rejected before parsing
//! - Every rejected input returns an error; NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealroom_proto::{Frame, MAX_FRAME_SIZE};

#[derive(Debug, Clone, Arbitrary)]
enum JsonAttack {
    DeeplyNested { depth: u16, object: bool },
    HugeArray { len_exponent: u8 },
    OutOfRangeByte { value: i64 },
    WrongIvLength { len: u8 },
    TypeConfusion { sender: String, recipient: String },
    DuplicateKeys { first: String, second: String },
}

fuzz_target!(|attack: JsonAttack| {
    let line = match attack {
        JsonAttack::DeeplyNested { depth, object } => {
            let depth = usize::from(depth % 4096);
            let (open, close) = if object { ("{\"a\":", "}") } else { ("[", "]") };
            format!(
                r#"{{"event":"room-envelope","data":{}1{}}}"#,
                open.repeat(depth),
                close.repeat(depth)
            )
        },

        JsonAttack::HugeArray { len_exponent } => {
            let len = 1usize << (len_exponent % 22);
            let ciphertext = vec!["7"; len].join(",");
            format!(
                r#"{{"event":"room-envelope","data":{{"room":"r","sender":"s","ciphertext":[{ciphertext}],"iv":[0,0,0,0,0,0,0,0,0,0,0,0]}}}}"#
            )
        },

        JsonAttack::OutOfRangeByte { value } => format!(
            r#"{{"event":"room-envelope","data":{{"room":"r","sender":"s","ciphertext":[{value},0,0,0,0,0,0,0,0,0,0,0,0,0,0,0],"iv":[0,0,0,0,0,0,0,0,0,0,0,0]}}}}"#
        ),

        JsonAttack::WrongIvLength { len } => {
            let iv = vec!["0"; usize::from(len % 32)].join(",");
            format!(
                r#"{{"event":"room-envelope","data":{{"room":"r","sender":"s","ciphertext":[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0],"iv":[{iv}]}}}}"#
            )
        },

        JsonAttack::TypeConfusion { sender, recipient } => {
            let sender = serde_escape(&sender);
            let recipient = serde_escape(&recipient);
            format!(
                r#"{{"event":"room-envelope","data":{{"sender":"{sender}","recipient":"{recipient}","wrappedSessionKey":[1],"ciphertext":[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0],"iv":[0,0,0,0,0,0,0,0,0,0,0,0]}}}}"#
            )
        },

        JsonAttack::DuplicateKeys { first, second } => {
            let first = serde_escape(&first);
            let second = serde_escape(&second);
            format!(r#"{{"event":"join","data":{{"username":"{first}","username":"{second}"}}}}"#)
        },
    };

    let result = Frame::decode(line.as_bytes());
    if line.len() > MAX_FRAME_SIZE {
        assert!(result.is_err(), "oversized line accepted");
    }
    if let Ok(frame) = result {
        assert!(frame.validate().is_ok());
    }
});

/// Keep fuzzer strings inside a JSON string literal.
fn serde_escape(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_control() && *c != '"' && *c != '\\').collect()
}
