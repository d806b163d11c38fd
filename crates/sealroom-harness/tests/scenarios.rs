//! End-to-end scenarios over the in-memory relay.
//!
//! Every client runs the production runtime; only the clock, randomness,
//! directory and network are simulated.

use std::time::Duration;

use sealroom_client::{
    Conversation, DEFAULT_ROOM_PASSPHRASE, DEFAULT_ROOM_SALT, PeerState, SendId, Session,
    SessionAction, SessionConfig, SessionError, SessionEvent,
};
use sealroom_crypto::{
    CryptoError, DEFAULT_ITERATIONS, UnwrapFailure, decrypt_parts, derive_room_key, unwrap_key,
};
use sealroom_harness::{MemoryDirectory, SimClient, SimEnv, SimWorld, fixture_key_pair};
use sealroom_proto::{DmEnvelope, Envelope, RoomEnvelope};

/// Cheap derivation for scenarios that are not about the RoomKey itself.
fn fast_config() -> SessionConfig {
    SessionConfig { kdf_iterations: 1_000, ..SessionConfig::default() }
}

fn room_envelopes(world: &SimWorld) -> Vec<RoomEnvelope> {
    world
        .relay
        .observed_envelopes()
        .into_iter()
        .filter_map(|e| match e {
            Envelope::Room(room) => Some(room),
            Envelope::Dm(_) => None,
        })
        .collect()
}

fn dm_envelopes(world: &SimWorld) -> Vec<DmEnvelope> {
    world
        .relay
        .observed_envelopes()
        .into_iter()
        .filter_map(|e| match e {
            Envelope::Dm(dm) => Some(dm),
            Envelope::Room(_) => None,
        })
        .collect()
}

async fn texts(client: &SimClient, conversation: Conversation) -> Vec<String> {
    client.handle.history(conversation).await.unwrap().into_iter().map(|m| m.text).collect()
}

#[tokio::test]
async fn room_message_decrypts_under_independently_derived_key() {
    let world = SimWorld::new(1);
    let mut alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    alice.handle.send_room_message("general", "hello").await.unwrap();

    let received = bob.wait_for("hello").await.unwrap();
    assert_eq!(received.sender, "alice");
    assert_eq!(received.conversation, Conversation::room("general"));

    // Relay echo is the only copy alice sees
    let echoed = alice.wait_for("hello").await.unwrap();
    assert_eq!(echoed.sender, "alice");
    assert_eq!(texts(&alice, Conversation::room("general")).await, ["hello"]);

    // Any client with the same configuration decrypts the wire envelope
    let room_key =
        derive_room_key(DEFAULT_ROOM_PASSPHRASE, DEFAULT_ROOM_SALT, DEFAULT_ITERATIONS).unwrap();
    let envelopes = room_envelopes(&world);
    assert_eq!(envelopes.len(), 1);
    let plaintext = decrypt_parts(&envelopes[0].ciphertext, &envelopes[0].iv, &room_key).unwrap();
    assert_eq!(plaintext, b"hello");
}

#[tokio::test]
async fn wire_carries_no_plaintext() {
    let world = SimWorld::with_config(2, fast_config());
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    alice.handle.send_room_message("general", "attack at dawn").await.unwrap();
    alice.handle.send_direct_message("bob", "meet at noon").await.unwrap();
    bob.wait_for("meet at noon").await.unwrap();

    for frame in world.relay.observed() {
        let wire = String::from_utf8(frame.encode().unwrap()).unwrap();
        assert!(!wire.contains("attack"), "room plaintext leaked: {wire}");
        assert!(!wire.contains("noon"), "dm plaintext leaked: {wire}");
    }
}

#[tokio::test]
async fn direct_message_reaches_only_the_recipient() {
    let world = SimWorld::with_config(3, fast_config());
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();
    let carol = world.join("carol").await.unwrap();

    alice.handle.send_direct_message("bob", "secret").await.unwrap();

    let received = bob.wait_for("secret").await.unwrap();
    assert_eq!(received.sender, "alice");
    assert_eq!(received.conversation, Conversation::dm("alice"));
    assert_eq!(bob.handle.peer_state("alice").await.unwrap(), PeerState::Active);

    // Local echo on the sender side
    assert_eq!(texts(&alice, Conversation::dm("bob")).await, ["secret"]);
    assert_eq!(alice.handle.peer_state("bob").await.unwrap(), PeerState::Active);

    assert!(texts(&carol, Conversation::dm("alice")).await.is_empty());

    // Carol holding the wire envelope still cannot unwrap it
    let envelope = dm_envelopes(&world).pop().unwrap();
    let carol_keys = fixture_key_pair("carol").unwrap();
    let result = unwrap_key(&envelope.wrapped_session_key, Some(&carol_keys.private));
    assert!(matches!(result, Err(CryptoError::Unwrap { reason: UnwrapFailure::Mismatch })));
}

#[tokio::test]
async fn third_party_session_rejects_redirected_envelope() {
    let world = SimWorld::with_config(4, fast_config());
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    alice.handle.send_direct_message("bob", "secret").await.unwrap();
    bob.wait_for("secret").await.unwrap();

    // A malicious relay re-addresses the envelope to carol
    let mut envelope = dm_envelopes(&world).pop().unwrap();
    envelope.recipient = "carol".to_string();

    let carol_keys = fixture_key_pair("carol").unwrap();
    let (mut carol, _) =
        Session::new(SimEnv::with_seed(9), "carol", fast_config(), Some(carol_keys.private))
            .unwrap();

    let result = carol.handle(SessionEvent::EnvelopeReceived(Envelope::Dm(envelope)));
    assert!(matches!(result, Err(SessionError::Unwrap { retryable: false, .. })));
    assert!(carol.history(&Conversation::dm("alice")).is_empty());
    assert_eq!(carol.peer_state("alice"), PeerState::NoSession);
}

#[tokio::test]
async fn rapid_direct_messages_each_carry_their_own_wrap() {
    let directory = MemoryDirectory::new().with_latency(Duration::from_millis(50));
    let world = SimWorld::with_config(5, fast_config()).with_directory(directory);
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    let (first, second) = tokio::join!(
        alice.handle.send_direct_message("bob", "first"),
        alice.handle.send_direct_message("bob", "second"),
    );
    first.unwrap();
    second.unwrap();

    // One lookup served both queued sends
    assert_eq!(world.directory.lookup_count(), 1);

    assert_eq!(bob.next_message().await.unwrap().text, "first");
    assert_eq!(bob.next_message().await.unwrap().text, "second");

    let envelopes = dm_envelopes(&world);
    assert_eq!(envelopes.len(), 2);
    assert_ne!(envelopes[0].wrapped_session_key, envelopes[1].wrapped_session_key);
    assert_ne!(envelopes[0].iv, envelopes[1].iv);

    // Each envelope is self-contained under bob's key
    let bob_keys = fixture_key_pair("bob").unwrap();
    for (envelope, text) in envelopes.iter().zip(["first", "second"]) {
        let key = unwrap_key(&envelope.wrapped_session_key, Some(&bob_keys.private)).unwrap();
        let plaintext = decrypt_parts(&envelope.ciphertext, &envelope.iv, &key).unwrap();
        assert_eq!(plaintext, text.as_bytes());
    }
}

#[tokio::test]
async fn every_direct_send_looks_up_the_peer_again() {
    let world = SimWorld::with_config(6, fast_config());
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    alice.handle.send_direct_message("bob", "one").await.unwrap();
    alice.handle.send_direct_message("bob", "two").await.unwrap();
    bob.wait_for("two").await.unwrap();

    assert_eq!(world.directory.lookup_count(), 2);
}

#[tokio::test]
async fn redelivered_room_message_is_admitted_once() {
    let world = SimWorld::with_config(7, fast_config());
    world.relay.set_duplicate_delivery(true);
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    alice.handle.send_room_message("general", "hello").await.unwrap();
    alice.handle.send_room_message("general", "sync").await.unwrap();
    bob.wait_for("sync").await.unwrap();

    assert_eq!(texts(&bob, Conversation::room("general")).await, ["hello", "sync"]);
}

#[tokio::test]
async fn identical_room_messages_two_seconds_apart_are_both_admitted() {
    let world = SimWorld::with_config(8, fast_config());
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    alice.handle.send_room_message("general", "hello").await.unwrap();
    bob.wait_for("hello").await.unwrap();

    world.env.advance(Duration::from_secs(2));

    alice.handle.send_room_message("general", "hello").await.unwrap();
    bob.wait_for("hello").await.unwrap();

    assert_eq!(texts(&bob, Conversation::room("general")).await, ["hello", "hello"]);
}

#[tokio::test]
async fn unknown_peer_fails_then_succeeds_after_publishing() {
    let world = SimWorld::with_config(9, fast_config());
    let alice = world.join("alice").await.unwrap();

    let error = alice.handle.send_direct_message("dave", "hi").await.unwrap_err();
    assert!(matches!(&error, SessionError::PeerKeyUnavailable { peer, .. } if peer == "dave"));
    assert!(error.is_retryable());
    assert_eq!(alice.handle.peer_state("dave").await.unwrap(), PeerState::NoSession);
    assert!(texts(&alice, Conversation::dm("dave")).await.is_empty());

    let mut dave = world.join("dave").await.unwrap();
    alice.handle.send_direct_message("dave", "hi").await.unwrap();

    assert_eq!(dave.wait_for("hi").await.unwrap().sender, "alice");
    assert_eq!(alice.handle.peer_state("dave").await.unwrap(), PeerState::Active);
}

#[tokio::test]
async fn directory_outage_keeps_active_session() {
    let world = SimWorld::with_config(10, fast_config());
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join("bob").await.unwrap();

    alice.handle.send_direct_message("bob", "before").await.unwrap();
    bob.wait_for("before").await.unwrap();

    world.directory.set_offline(true);
    let error = alice.handle.send_direct_message("bob", "during").await.unwrap_err();
    assert!(matches!(error, SessionError::PeerKeyUnavailable { .. }));
    assert_eq!(alice.handle.peer_state("bob").await.unwrap(), PeerState::Active);

    world.directory.set_offline(false);
    alice.handle.send_direct_message("bob", "after").await.unwrap();
    bob.wait_for("after").await.unwrap();

    assert_eq!(texts(&bob, Conversation::dm("alice")).await, ["before", "after"]);
}

#[tokio::test]
async fn cold_start_buffers_direct_messages_until_key_is_provided() {
    let world = SimWorld::with_config(11, fast_config());
    let alice = world.join("alice").await.unwrap();
    let mut bob = world.join_without_private_key("bob").await.unwrap();

    alice.handle.send_direct_message("bob", "secret").await.unwrap();
    alice.handle.send_room_message("lobby", "sync").await.unwrap();
    bob.wait_for("sync").await.unwrap();

    // Parked, not dropped
    assert!(texts(&bob, Conversation::dm("alice")).await.is_empty());

    let bob_keys = fixture_key_pair("bob").unwrap();
    bob.handle.provide_private_key(bob_keys.private).await.unwrap();

    let replayed = bob.wait_for("secret").await.unwrap();
    assert_eq!(replayed.conversation, Conversation::dm("alice"));
    assert_eq!(bob.handle.peer_state("alice").await.unwrap(), PeerState::Active);
}

#[tokio::test]
async fn empty_messages_are_rejected_before_reaching_the_relay() {
    let world = SimWorld::with_config(12, fast_config());
    let alice = world.join("alice").await.unwrap();

    let room = alice.handle.send_room_message("general", "   ").await;
    let dm = alice.handle.send_direct_message("bob", "").await;

    assert_eq!(room, Err(SessionError::EmptyMessage));
    assert_eq!(dm, Err(SessionError::EmptyMessage));
    assert!(world.relay.observed_envelopes().is_empty());
    assert_eq!(world.directory.lookup_count(), 0);
}

#[tokio::test]
async fn shutdown_discards_inflight_lookup() {
    let directory = MemoryDirectory::new().with_latency(Duration::from_millis(200));
    let world = SimWorld::with_config(13, fast_config()).with_directory(directory);
    let alice = world.join("alice").await.unwrap();
    let _bob = world.join("bob").await.unwrap();

    let handle = alice.handle.clone();
    let send = tokio::spawn(async move { handle.send_direct_message("bob", "late").await });

    while world.directory.lookup_count() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    alice.stop().await.unwrap();

    assert_eq!(send.await.unwrap(), Err(SessionError::Closed));
    assert!(dm_envelopes(&world).is_empty());
}

#[test]
fn sessions_hold_their_own_room_key() {
    let env = SimEnv::with_seed(14);
    let other_room = SessionConfig { room_passphrase: "other-secret".into(), ..fast_config() };

    let (alice, _) = Session::new(env.clone(), "alice", fast_config(), None).unwrap();
    let (bob, _) = Session::new(env.clone(), "bob", fast_config(), None).unwrap();
    let (mut mallory, _) = Session::new(env, "mallory", other_room, None).unwrap();

    assert_eq!(alice.room_key_fingerprint(), bob.room_key_fingerprint());
    assert_ne!(alice.room_key_fingerprint(), mallory.room_key_fingerprint());

    // A session on a different passphrase cannot read the room
    let (mut sender, _) =
        Session::new(SimEnv::with_seed(15), "alice", fast_config(), None).unwrap();
    let actions = sender
        .handle(SessionEvent::SendRoomMessage {
            id: SendId(0),
            room: "general".into(),
            text: "hi".into(),
        })
        .unwrap();
    let envelope = actions
        .into_iter()
        .find_map(|a| match a {
            SessionAction::Send(envelope) => Some(envelope),
            _ => None,
        })
        .unwrap();

    let result = mallory.handle(SessionEvent::EnvelopeReceived(envelope));
    assert_eq!(result.unwrap_err(), SessionError::Decryption);
}
