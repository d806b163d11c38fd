//! Property-based tests for the delivery reconciler
//!
//! Generates arbitrary receipt streams (few senders, few texts, small time
//! gaps so collisions are common) and checks the log invariants.

use std::time::Duration;

use proptest::prelude::*;
use sealroom_core::{
    Admission, Conversation, DEFAULT_DEDUP_WINDOW, DecryptedMessage, DedupPolicy, Reconciler,
    VirtualInstant,
};

/// (sender, text, room, gap since previous receipt in ms)
fn arbitrary_stream() -> impl Strategy<Value = Vec<(u8, u8, u8, u64)>> {
    prop::collection::vec((0u8..3, 0u8..3, 0u8..2, 0u64..1500), 1..60)
}

fn materialize(stream: &[(u8, u8, u8, u64)]) -> Vec<DecryptedMessage<VirtualInstant>> {
    let mut now = VirtualInstant::EPOCH;
    stream
        .iter()
        .map(|&(sender, text, room, gap)| {
            now = now + Duration::from_millis(gap);
            DecryptedMessage {
                sender: format!("user{sender}"),
                text: format!("text{text}"),
                conversation: Conversation::room(format!("room{room}")),
                received_at: now,
            }
        })
        .collect()
}

#[test]
fn prop_log_preserves_admission_order() {
    proptest!(|(stream in arbitrary_stream())| {
        let mut reconciler = Reconciler::new(DEFAULT_DEDUP_WINDOW);
        let mut expected: Vec<DecryptedMessage<VirtualInstant>> = Vec::new();

        for message in materialize(&stream) {
            if reconciler.admit(message.clone(), DedupPolicy::Window) == Admission::Accepted {
                expected.push(message);
            }
        }

        for conversation in reconciler.conversations() {
            let filtered: Vec<_> =
                expected.iter().filter(|m| &m.conversation == conversation).cloned().collect();
            prop_assert_eq!(reconciler.history(conversation), filtered.as_slice());
        }
        prop_assert_eq!(reconciler.len(), expected.len());
    });
}

#[test]
fn prop_no_two_matching_entries_inside_window() {
    proptest!(|(stream in arbitrary_stream())| {
        let mut reconciler = Reconciler::new(DEFAULT_DEDUP_WINDOW);
        for message in materialize(&stream) {
            reconciler.admit(message, DedupPolicy::Window);
        }

        for conversation in reconciler.conversations() {
            let log = reconciler.history(conversation);
            for (i, later) in log.iter().enumerate() {
                for earlier in &log[..i] {
                    let same = earlier.sender == later.sender && earlier.text == later.text;
                    prop_assert!(
                        !same || later.received_at - earlier.received_at >= DEFAULT_DEDUP_WINDOW,
                        "duplicate admitted inside window"
                    );
                }
            }
        }
    });
}

#[test]
fn prop_always_admit_keeps_everything() {
    proptest!(|(stream in arbitrary_stream())| {
        let messages = materialize(&stream);
        let mut reconciler = Reconciler::new(DEFAULT_DEDUP_WINDOW);

        for message in messages.iter().cloned() {
            prop_assert_eq!(reconciler.admit(message, DedupPolicy::AlwaysAdmit), Admission::Accepted);
        }
        prop_assert_eq!(reconciler.len(), messages.len());
    });
}
