//! Decrypted messages and the conversations they belong to.

use std::fmt;

/// Which trust model a conversation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationKind {
    /// Broadcast room under the shared RoomKey
    Room,
    /// Pairwise conversation under a per-peer session key
    Dm,
}

/// A conversation log key.
///
/// For rooms `id` is the room name. For DMs it is the *remote* peer's
/// username, so both directions of a DM land in the same log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Conversation {
    /// Room or DM
    pub kind: ConversationKind,
    /// Room name or peer username
    pub id: String,
}

impl Conversation {
    /// Room conversation.
    pub fn room(name: impl Into<String>) -> Self {
        Self { kind: ConversationKind::Room, id: name.into() }
    }

    /// DM conversation with `peer`.
    pub fn dm(peer: impl Into<String>) -> Self {
        Self { kind: ConversationKind::Dm, id: peer.into() }
    }
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConversationKind::Room => write!(f, "#{}", self.id),
            ConversationKind::Dm => write!(f, "@{}", self.id),
        }
    }
}

/// Plaintext message surfaced to the caller.
///
/// Created by successful decryption (or by a local DM send), appended to its
/// conversation log and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage<I> {
    /// Username of the author
    pub sender: String,
    /// Decrypted text
    pub text: String,
    /// Conversation the message belongs to
    pub conversation: Conversation,
    /// Local receipt time
    pub received_at: I,
}
