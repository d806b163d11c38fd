//! Delivery reconciler.
//!
//! The relay echoes a sender's own room broadcast back to them and may
//! redeliver envelopes. Room envelopes carry no message id, so duplicates are
//! recognised heuristically: same sender, same text, same conversation,
//! received within a short trailing window.
//!
//! # Invariants
//!
//! - Logs are append-only; admitted messages are never mutated or removed
//! - Within one conversation, log order is admission order
//! - A candidate rejected as a duplicate leaves every log unchanged

use std::{collections::HashMap, ops::Sub, time::Duration};

use crate::message::{Conversation, DecryptedMessage};

/// Default trailing window for room deduplication.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(1);

/// How a candidate is checked before it is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Reject if a matching entry was admitted within the window.
    Window,
    /// Append unconditionally.
    AlwaysAdmit,
}

/// Outcome of [`Reconciler::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended to the conversation log
    Accepted,
    /// Matched an earlier entry inside the window; dropped
    Duplicate,
}

/// Per-conversation append-only message logs with duplicate suppression.
#[derive(Debug, Clone)]
pub struct Reconciler<I> {
    window: Duration,
    logs: HashMap<Conversation, Vec<DecryptedMessage<I>>>,
}

impl<I> Reconciler<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a reconciler with the given dedup window.
    pub fn new(window: Duration) -> Self {
        Self { window, logs: HashMap::new() }
    }

    /// Configured dedup window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit a candidate into its conversation log.
    pub fn admit(&mut self, candidate: DecryptedMessage<I>, policy: DedupPolicy) -> Admission {
        let log = self.logs.entry(candidate.conversation.clone()).or_default();

        if policy == DedupPolicy::Window && is_duplicate(log, &candidate, self.window) {
            return Admission::Duplicate;
        }

        log.push(candidate);
        Admission::Accepted
    }

    /// Admitted messages of one conversation, in admission order.
    pub fn history(&self, conversation: &Conversation) -> &[DecryptedMessage<I>] {
        self.logs.get(conversation).map_or(&[], Vec::as_slice)
    }

    /// Conversations with at least one admitted message.
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.logs.iter().filter(|(_, log)| !log.is_empty()).map(|(conversation, _)| conversation)
    }

    /// Total admitted messages across all conversations.
    pub fn len(&self) -> usize {
        self.logs.values().map(Vec::len).sum()
    }

    /// True if nothing has been admitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_duplicate<I>(
    log: &[DecryptedMessage<I>],
    candidate: &DecryptedMessage<I>,
    window: Duration,
) -> bool
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    // Entries are in receipt order, so stop at the first one outside the window
    log.iter()
        .rev()
        .take_while(|entry| candidate.received_at - entry.received_at < window)
        .any(|entry| entry.sender == candidate.sender && entry.text == candidate.text)
}
