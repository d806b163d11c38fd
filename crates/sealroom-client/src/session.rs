//! Session state machine.
//!
//! The `Session` owns all key material for one logged-in user: the RoomKey,
//! the optional RSA private key and the per-peer DM session keys. It decides
//! which key encrypts each outbound message and which key opens each inbound
//! envelope, then runs every decrypted message through the reconciler.
//!
//! # Suspension points
//!
//! The only asynchronous step on the outbound path is the public-key lookup.
//! The session asks for it with [`SessionAction::ResolvePeerKey`] and parks
//! the send until the caller answers with [`SessionEvent::PeerKeyResolved`]
//! or [`SessionEvent::PeerKeyUnavailable`]. Sends to a peer whose lookup is
//! already in flight queue behind it, so at most one lookup per peer is
//! outstanding and sends leave in the order they were requested.
//!
//! On the inbound path, a DM that arrives before the private key is loaded is
//! parked until [`SessionEvent::PrivateKeyLoaded`].

use std::collections::{HashMap, VecDeque};

use sealroom_core::{
    Admission, Conversation, DecryptedMessage, DedupPolicy, Environment, Reconciler,
};
use sealroom_crypto::{
    PrivateKey, PublicKey, SymmetricKey, UnwrapFailure, decrypt_parts, derive_room_key, encrypt,
    unwrap_key, wrap_key,
};
use sealroom_proto::{DmEnvelope, Envelope, ProtocolError, RoomEnvelope};

use crate::{
    config::SessionConfig,
    dm_store::{DmSessionStore, PeerState},
    error::SessionError,
    event::{SendId, SessionAction, SessionEvent},
};

/// A DM waiting for its recipient's public key.
struct PendingSend {
    id: SendId,
    text: String,
}

/// Session for one user.
///
/// Pure state machine: no I/O. Time and randomness come from the
/// [`Environment`]; everything else arrives as a [`SessionEvent`].
///
/// # Invariants
///
/// - The RoomKey and private key are never replaced by a failed message
/// - A DM session key is cached only after its ciphertext authenticated
/// - `pending_sends[peer]` is non-empty iff a lookup for `peer` is in flight
pub struct Session<E: Environment> {
    env: E,
    username: String,
    config: SessionConfig,
    room_key: SymmetricKey,
    private_key: Option<PrivateKey>,
    dm_sessions: DmSessionStore,
    pending_sends: HashMap<String, VecDeque<PendingSend>>,
    pending_unwraps: VecDeque<DmEnvelope>,
    reconciler: Reconciler<E::Instant>,
}

impl<E: Environment> Session<E> {
    /// Create a session, deriving the RoomKey from `config`.
    ///
    /// # Errors
    ///
    /// - `KeyDerivation`: the RoomKey cannot be derived. Fatal; room
    ///   messaging cannot proceed.
    pub fn new(
        env: E,
        username: impl Into<String>,
        config: SessionConfig,
        private_key: Option<PrivateKey>,
    ) -> Result<(Self, Vec<SessionAction<E::Instant>>), SessionError> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "username",
                reason: "must not be empty",
            }
            .into());
        }

        let room_key =
            derive_room_key(&config.room_passphrase, &config.room_salt, config.kdf_iterations)
                .map_err(SessionError::from_crypto)?;

        let mut actions = vec![SessionAction::Log {
            message: format!(
                "session for {username} ready, room key {}",
                room_key.fingerprint()
            ),
        }];

        if private_key.is_none() {
            actions.push(SessionAction::KeyProvisioningNeeded {
                reason: "no private key in local key store".to_string(),
            });
        }

        let session = Self {
            env,
            username,
            reconciler: Reconciler::new(config.dedup_window),
            config,
            room_key,
            private_key,
            dm_sessions: DmSessionStore::new(),
            pending_sends: HashMap::new(),
            pending_unwraps: VecDeque::new(),
        };

        Ok((session, actions))
    }

    /// Local username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Fingerprint of the RoomKey, safe to display.
    pub fn room_key_fingerprint(&self) -> String {
        self.room_key.fingerprint()
    }

    /// True once a private key is available for inbound DMs.
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// DM session state for `peer`.
    pub fn peer_state(&self, peer: &str) -> PeerState {
        self.dm_sessions.state(peer)
    }

    /// Admitted messages of one conversation, in admission order.
    pub fn history(&self, conversation: &Conversation) -> &[DecryptedMessage<E::Instant>] {
        self.reconciler.history(conversation)
    }

    /// Inbound DMs parked until the private key is loaded.
    pub fn pending_unwrap_count(&self) -> usize {
        self.pending_unwraps.len()
    }

    /// Sends to `peer` waiting for its public key.
    pub fn pending_send_count(&self, peer: &str) -> usize {
        self.pending_sends.get(peer).map_or(0, VecDeque::len)
    }

    /// Process an event and return resulting actions.
    ///
    /// An `Err` is scoped to this one event; the session stays usable.
    pub fn handle(
        &mut self,
        event: SessionEvent,
    ) -> Result<Vec<SessionAction<E::Instant>>, SessionError> {
        match event {
            SessionEvent::EnvelopeReceived(envelope) => self.handle_envelope(envelope),
            SessionEvent::SendRoomMessage { id, room, text } => {
                self.handle_send_room(id, room, &text)
            },
            SessionEvent::SendDirectMessage { id, peer, text } => {
                self.handle_send_direct(id, peer, text)
            },
            SessionEvent::PeerKeyResolved { peer, public_key } => {
                Ok(self.handle_peer_key_resolved(&peer, &public_key))
            },
            SessionEvent::PeerKeyUnavailable { peer, reason } => {
                Ok(self.handle_peer_key_unavailable(&peer, &reason))
            },
            SessionEvent::PrivateKeyLoaded(private_key) => {
                Ok(self.handle_private_key_loaded(private_key))
            },
        }
    }

    fn handle_send_room(
        &mut self,
        id: SendId,
        room: String,
        text: &str,
    ) -> Result<Vec<SessionAction<E::Instant>>, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let sealed = encrypt(text.as_bytes(), &self.room_key, self.env.random_array());
        let envelope = RoomEnvelope {
            room,
            sender: self.username.clone(),
            ciphertext: sealed.ciphertext,
            iv: sealed.iv,
        };
        envelope.validate()?;

        let message = format!("room message to #{} ({} bytes)", envelope.room, text.len());
        let envelope = Envelope::Room(envelope);
        envelope.frame_len()?;

        // No local echo: the relay broadcasts back to us and that copy is admitted
        Ok(vec![
            SessionAction::Send(envelope),
            SessionAction::SendCompleted { id },
            SessionAction::Log { message },
        ])
    }

    fn handle_send_direct(
        &mut self,
        id: SendId,
        peer: String,
        text: String,
    ) -> Result<Vec<SessionAction<E::Instant>>, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        if peer.trim().is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "recipient",
                reason: "must not be empty",
            }
            .into());
        }

        let mut actions = Vec::new();

        if self.dm_sessions.state(&peer) == PeerState::NoSession {
            let key = SymmetricKey::from_random(self.env.random_array());
            self.dm_sessions.begin(&peer, key);
            actions.push(SessionAction::Log {
                message: format!("establishing DM session with {peer}"),
            });
        }

        let queue = self.pending_sends.entry(peer.clone()).or_default();
        let lookup_in_flight = !queue.is_empty();
        queue.push_back(PendingSend { id, text });

        if lookup_in_flight {
            actions.push(SessionAction::Log {
                message: format!("DM to {peer} queued behind key lookup ({} waiting)", queue.len()),
            });
        } else {
            actions.push(SessionAction::ResolvePeerKey { peer });
        }

        Ok(actions)
    }

    fn handle_peer_key_resolved(
        &mut self,
        peer: &str,
        public_key: &PublicKey,
    ) -> Vec<SessionAction<E::Instant>> {
        let Some(queue) = self.pending_sends.remove(peer) else {
            return vec![SessionAction::Log {
                message: format!("ignoring key for {peer}: no sends waiting"),
            }];
        };

        // An inbound DM may have replaced the key since the lookup started
        let key = if let Some(key) = self.dm_sessions.key(peer) {
            key.clone()
        } else {
            let key = SymmetricKey::from_random(self.env.random_array());
            self.dm_sessions.begin(peer, key.clone());
            key
        };

        let mut actions = Vec::with_capacity(queue.len() * 3);
        let mut failure: Option<SessionError> = None;
        let mut completed = 0usize;

        for pending in queue {
            if let Some(error) = &failure {
                actions.push(SessionAction::SendFailed { id: pending.id, error: error.clone() });
                continue;
            }

            // Every send carries its own wrap of the session key
            let wrapped = match wrap_key(&key, public_key, self.env.random_array()) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    let error = SessionError::PeerKeyUnavailable {
                        peer: peer.to_string(),
                        reason: e.to_string(),
                    };
                    actions
                        .push(SessionAction::SendFailed { id: pending.id, error: error.clone() });
                    failure = Some(error);
                    continue;
                },
            };

            let sealed = encrypt(pending.text.as_bytes(), &key, self.env.random_array());
            let envelope = Envelope::Dm(DmEnvelope {
                sender: self.username.clone(),
                recipient: peer.to_string(),
                wrapped_session_key: wrapped,
                ciphertext: sealed.ciphertext,
                iv: sealed.iv,
            });

            // Too large for any transport: fail this send only, and admit no echo
            if let Err(e) = envelope.frame_len() {
                actions.push(SessionAction::SendFailed { id: pending.id, error: e.into() });
                continue;
            }

            actions.push(SessionAction::Send(envelope));
            actions.push(SessionAction::SendCompleted { id: pending.id });
            completed += 1;

            // DMs are not echoed by the relay, so admit our own copy now
            let echo = DecryptedMessage {
                sender: self.username.clone(),
                text: pending.text,
                conversation: Conversation::dm(peer),
                received_at: self.env.now(),
            };
            actions.extend(self.admit(echo, DedupPolicy::AlwaysAdmit));
        }

        if completed > 0 {
            self.dm_sessions.activate(peer);
        } else {
            self.dm_sessions.abandon(peer);
        }
        actions
    }

    fn handle_peer_key_unavailable(
        &mut self,
        peer: &str,
        reason: &str,
    ) -> Vec<SessionAction<E::Instant>> {
        let Some(queue) = self.pending_sends.remove(peer) else {
            return vec![SessionAction::Log {
                message: format!("ignoring failed lookup for {peer}: no sends waiting"),
            }];
        };

        self.dm_sessions.abandon(peer);

        let error =
            SessionError::PeerKeyUnavailable { peer: peer.to_string(), reason: reason.to_string() };
        let mut actions: Vec<_> = queue
            .into_iter()
            .map(|pending| SessionAction::SendFailed { id: pending.id, error: error.clone() })
            .collect();
        actions.push(SessionAction::Log {
            message: format!("key lookup for {peer} failed: {reason}"),
        });
        actions
    }

    fn handle_private_key_loaded(
        &mut self,
        private_key: PrivateKey,
    ) -> Vec<SessionAction<E::Instant>> {
        self.private_key = Some(private_key);

        let buffered = std::mem::take(&mut self.pending_unwraps);
        let mut actions = vec![SessionAction::Log {
            message: format!("private key loaded, replaying {} buffered DMs", buffered.len()),
        }];

        for envelope in buffered {
            let sender = envelope.sender.clone();
            match self.open_dm(envelope) {
                Ok(opened) => actions.extend(opened),
                Err(e) => actions.push(SessionAction::Log {
                    message: format!("buffered DM from {sender} dropped: {e}"),
                }),
            }
        }

        actions
    }

    fn handle_envelope(
        &mut self,
        envelope: Envelope,
    ) -> Result<Vec<SessionAction<E::Instant>>, SessionError> {
        envelope.validate()?;

        match envelope {
            Envelope::Room(room) => self.open_room(&room),
            Envelope::Dm(dm) => {
                if dm.recipient != self.username {
                    return Err(SessionError::Misaddressed { recipient: dm.recipient });
                }

                if self.private_key.is_none() {
                    return self.park_dm(dm);
                }

                self.open_dm(dm)
            },
        }
    }

    fn open_room(
        &mut self,
        envelope: &RoomEnvelope,
    ) -> Result<Vec<SessionAction<E::Instant>>, SessionError> {
        let plaintext = decrypt_parts(&envelope.ciphertext, &envelope.iv, &self.room_key)
            .map_err(SessionError::from_crypto)?;

        let candidate = DecryptedMessage {
            sender: envelope.sender.clone(),
            text: String::from_utf8_lossy(&plaintext).into_owned(),
            conversation: Conversation::room(envelope.room.clone()),
            received_at: self.env.now(),
        };

        Ok(self.admit(candidate, DedupPolicy::Window))
    }

    /// Unwrap happens-before decrypt; the key is cached only if both succeed.
    fn open_dm(
        &mut self,
        envelope: DmEnvelope,
    ) -> Result<Vec<SessionAction<E::Instant>>, SessionError> {
        let key = unwrap_key(&envelope.wrapped_session_key, self.private_key.as_ref())
            .map_err(SessionError::from_crypto)?;

        let plaintext = decrypt_parts(&envelope.ciphertext, &envelope.iv, &key)
            .map_err(SessionError::from_crypto)?;

        self.dm_sessions.store(&envelope.sender, key);

        let candidate = DecryptedMessage {
            text: String::from_utf8_lossy(&plaintext).into_owned(),
            conversation: Conversation::dm(envelope.sender.clone()),
            sender: envelope.sender,
            received_at: self.env.now(),
        };

        Ok(self.admit(candidate, DedupPolicy::AlwaysAdmit))
    }

    fn park_dm(
        &mut self,
        envelope: DmEnvelope,
    ) -> Result<Vec<SessionAction<E::Instant>>, SessionError> {
        if self.config.max_pending_unwraps == 0 {
            return Err(SessionError::Unwrap {
                reason: UnwrapFailure::MissingPrivateKey,
                retryable: true,
            });
        }

        let mut actions = Vec::new();

        if self.pending_unwraps.len() >= self.config.max_pending_unwraps {
            if let Some(dropped) = self.pending_unwraps.pop_front() {
                actions.push(SessionAction::Log {
                    message: format!(
                        "unwrap buffer full, dropped oldest DM from {}",
                        dropped.sender
                    ),
                });
            }
        }

        actions.push(SessionAction::Log {
            message: format!("DM from {} buffered until private key loads", envelope.sender),
        });
        self.pending_unwraps.push_back(envelope);

        Ok(actions)
    }

    fn admit(
        &mut self,
        candidate: DecryptedMessage<E::Instant>,
        policy: DedupPolicy,
    ) -> Vec<SessionAction<E::Instant>> {
        let conversation = candidate.conversation.clone();
        let sender = candidate.sender.clone();

        match self.reconciler.admit(candidate.clone(), policy) {
            Admission::Accepted => vec![SessionAction::Deliver(candidate)],
            Admission::Duplicate => vec![SessionAction::Log {
                message: format!("duplicate from {sender} in {conversation} suppressed"),
            }],
        }
    }
}
