//! DM session store for per-peer session keys.
//!
//! Every DM carries its own wrapped copy of the session key, so an entry here
//! is a sender-side cache (reuse the key for the next send to that peer), not
//! a security boundary. Each inbound DM is unwrapped independently.

use std::collections::HashMap;

use sealroom_crypto::SymmetricKey;

/// Per-peer session state.
///
/// ```text
/// ┌───────────┐  first send   ┌──────────────┐  key resolved  ┌────────┐
/// │ NoSession │──────────────>│ Establishing │───────────────>│ Active │
/// └───────────┘               └──────────────┘                └────────┘
///       ^                        │        │                        ^
///       └────────────────────────┘        └────────────────────────┘
///           lookup failed                     inbound DM decrypted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No session key cached for the peer
    NoSession,
    /// Key generated, waiting for the peer's public key
    Establishing,
    /// Key cached and usable
    Active,
}

struct PeerSession {
    key: SymmetricKey,
    state: PeerState,
}

/// Session keys for all DM peers.
///
/// # Invariants
///
/// - At most one key per peer; the last writer wins
/// - An entry is never in `NoSession`; absence is `NoSession`
#[derive(Default)]
pub struct DmSessionStore {
    sessions: HashMap<String, PeerSession>,
}

impl DmSessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `peer`.
    pub fn state(&self, peer: &str) -> PeerState {
        self.sessions.get(peer).map_or(PeerState::NoSession, |s| s.state)
    }

    /// Cached key for `peer`, in `Establishing` or `Active`.
    pub fn key(&self, peer: &str) -> Option<&SymmetricKey> {
        self.sessions.get(peer).map(|s| &s.key)
    }

    /// Start establishing a session with a freshly generated key.
    ///
    /// Returns false (and leaves the entry untouched) if a key is already
    /// cached.
    pub fn begin(&mut self, peer: &str, key: SymmetricKey) -> bool {
        if self.sessions.contains_key(peer) {
            return false;
        }
        self.sessions.insert(peer.to_string(), PeerSession { key, state: PeerState::Establishing });
        true
    }

    /// Mark an established session active.
    pub fn activate(&mut self, peer: &str) {
        if let Some(session) = self.sessions.get_mut(peer) {
            session.state = PeerState::Active;
        }
    }

    /// Store a key learned from an authenticated inbound DM.
    ///
    /// Overwrites whatever was cached, regardless of state.
    pub fn store(&mut self, peer: &str, key: SymmetricKey) {
        self.sessions.insert(peer.to_string(), PeerSession { key, state: PeerState::Active });
    }

    /// Drop an `Establishing` entry after its lookup failed.
    ///
    /// `Active` entries are kept; a failed lookup says nothing about a key
    /// that is already in use.
    pub fn abandon(&mut self, peer: &str) {
        if self.state(peer) == PeerState::Establishing {
            self.sessions.remove(peer);
        }
    }

    /// Number of peers with a cached key.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no keys are cached.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; 32])
    }

    #[test]
    fn unknown_peer_has_no_session() {
        let store = DmSessionStore::new();
        assert_eq!(store.state("bob"), PeerState::NoSession);
        assert!(store.key("bob").is_none());
    }

    #[test]
    fn begin_then_activate() {
        let mut store = DmSessionStore::new();

        assert!(store.begin("bob", key(1)));
        assert_eq!(store.state("bob"), PeerState::Establishing);

        store.activate("bob");
        assert_eq!(store.state("bob"), PeerState::Active);
        assert_eq!(store.key("bob").map(SymmetricKey::as_bytes), Some(&[1; 32]));
    }

    #[test]
    fn begin_keeps_existing_key() {
        let mut store = DmSessionStore::new();
        store.begin("bob", key(1));

        assert!(!store.begin("bob", key(2)));
        assert_eq!(store.key("bob").map(SymmetricKey::as_bytes), Some(&[1; 32]));
    }

    #[test]
    fn store_overwrites_last_writer_wins() {
        let mut store = DmSessionStore::new();
        store.begin("alice", key(1));
        store.store("alice", key(2));
        store.store("alice", key(3));

        assert_eq!(store.state("alice"), PeerState::Active);
        assert_eq!(store.key("alice").map(SymmetricKey::as_bytes), Some(&[3; 32]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn abandon_only_drops_establishing() {
        let mut store = DmSessionStore::new();
        store.begin("bob", key(1));
        store.store("carol", key(2));

        store.abandon("bob");
        store.abandon("carol");

        assert_eq!(store.state("bob"), PeerState::NoSession);
        assert_eq!(store.state("carol"), PeerState::Active);
    }
}
