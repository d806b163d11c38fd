//! Runtime lifecycle against a hand-driven relay end.

use std::{sync::Arc, time::Duration};

use sealroom_app::{AppError, CHANNEL_CAPACITY, RelayEnd, SessionSetup, Transport, init_session};
use sealroom_client::{Conversation, MemoryKeyStore, SessionConfig, SessionError, StoredKeyPair};
use sealroom_harness::{MemoryDirectory, SimEnv, fixture_key_pair};
use sealroom_proto::{Frame, ProtocolError, RoomEnvelope};
use tokio::sync::broadcast::error::TryRecvError;

fn setup(directory: MemoryDirectory) -> (SessionSetup<SimEnv>, RelayEnd) {
    let (transport, relay) = Transport::channel(CHANNEL_CAPACITY);
    let setup = SessionSetup {
        env: SimEnv::with_seed(3),
        username: "alice".to_string(),
        config: SessionConfig { kdf_iterations: 1_000, ..SessionConfig::default() },
        key_store: Arc::new(MemoryKeyStore::new()),
        directory: Arc::new(directory),
        transport,
    };
    (setup, relay)
}

#[tokio::test]
async fn init_announces_username() {
    let (setup, mut relay) = setup(MemoryDirectory::new());

    let (_handle, _runtime) = init_session(setup).await.unwrap();

    assert_eq!(relay.from_client.recv().await, Some(Frame::Join { username: "alice".into() }));
}

#[tokio::test]
async fn invalid_derivation_parameters_are_fatal() {
    let (mut setup, _relay) = setup(MemoryDirectory::new());
    setup.config.kdf_iterations = 0;

    let result = init_session(setup).await;

    assert!(matches!(result, Err(AppError::Session(SessionError::KeyDerivation { .. }))));
}

#[tokio::test]
async fn corrupt_key_store_is_fatal() {
    let (mut setup, _relay) = setup(MemoryDirectory::new());
    setup.key_store = Arc::new(MemoryKeyStore::with_pair(StoredKeyPair {
        public_key: "AAAA".into(),
        private_key: "not a key".into(),
    }));

    let result = init_session(setup).await;

    assert!(matches!(result, Err(AppError::KeyStore(_))));
}

#[tokio::test]
async fn room_send_reaches_transport_and_echo_is_delivered() {
    let (setup, mut relay) = setup(MemoryDirectory::new());
    let (handle, runtime) = init_session(setup).await.unwrap();
    let runtime = tokio::spawn(runtime.run());
    let mut inbox = handle.subscribe();

    handle.send_room_message("general", "hi").await.unwrap();

    let _join = relay.from_client.recv().await.unwrap();
    let sent = relay.from_client.recv().await.unwrap();
    assert_eq!(sent.event_name(), "room-envelope");

    // Nothing is surfaced until the relay echoes it
    assert!(inbox.try_recv().is_err());
    relay.to_client.send(sent).await.unwrap();
    assert_eq!(inbox.recv().await.unwrap().text, "hi");

    handle.shutdown().await;
    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn undecryptable_envelope_does_not_stop_runtime() {
    let (setup, mut relay) = setup(MemoryDirectory::new());
    let (handle, runtime) = init_session(setup).await.unwrap();
    let runtime = tokio::spawn(runtime.run());
    let mut inbox = handle.subscribe();

    handle.send_room_message("general", "still here").await.unwrap();
    let _join = relay.from_client.recv().await.unwrap();
    let echo = relay.from_client.recv().await.unwrap();

    let garbage = RoomEnvelope {
        room: "general".into(),
        sender: "mallory".into(),
        ciphertext: vec![0xAB; 32],
        iv: [0; 12],
    };
    relay.to_client.send(Frame::RoomEnvelope(garbage)).await.unwrap();
    relay.to_client.send(echo).await.unwrap();

    // The echo queued behind the garbage still gets through
    assert_eq!(inbox.recv().await.unwrap().text, "still here");
    let history = handle.history(Conversation::room("general")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender, "alice");
    assert!(handle.is_alive());

    handle.shutdown().await;
    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn requests_after_shutdown_are_closed() {
    let (setup, _relay) = setup(MemoryDirectory::new());
    let (handle, runtime) = init_session(setup).await.unwrap();
    let runtime = tokio::spawn(runtime.run());

    handle.shutdown().await;
    runtime.await.unwrap().unwrap();

    assert!(!handle.is_alive());
    assert_eq!(handle.send_room_message("general", "hi").await, Err(SessionError::Closed));
    assert_eq!(
        handle.history(Conversation::room("general")).await.unwrap_err(),
        SessionError::Closed
    );
}

#[tokio::test]
async fn dropping_every_handle_stops_runtime() {
    let (setup, _relay) = setup(MemoryDirectory::new());
    let (handle, runtime) = init_session(setup).await.unwrap();
    let runtime = tokio::spawn(runtime.run());

    let clone = handle.clone();
    drop(handle);
    drop(clone);

    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn transport_close_fails_pending_sends() {
    let directory = MemoryDirectory::new().with_latency(Duration::from_millis(100));
    let (setup, relay) = setup(directory.clone());
    let (handle, runtime) = init_session(setup).await.unwrap();
    let runtime = tokio::spawn(runtime.run());

    let sender = handle.clone();
    let send = tokio::spawn(async move { sender.send_direct_message("bob", "lost").await });
    while directory.lookup_count() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    drop(relay);

    let result = runtime.await.unwrap();
    assert!(matches!(&result, Err(e) if e.is_transient()));
    assert!(matches!(send.await.unwrap(), Err(SessionError::Transport { .. })));
    assert!(!handle.is_alive());
}

#[tokio::test]
async fn oversized_room_message_never_reaches_transport() {
    let (setup, mut relay) = setup(MemoryDirectory::new());
    let (handle, runtime) = init_session(setup).await.unwrap();
    let runtime = tokio::spawn(runtime.run());

    let result = handle.send_room_message("general", "x".repeat(400 * 1024)).await;
    assert!(matches!(
        result,
        Err(SessionError::InvalidEnvelope(ProtocolError::FrameTooLarge { .. }))
    ));

    handle.send_room_message("general", "small").await.unwrap();
    let _join = relay.from_client.recv().await.unwrap();
    let next = relay.from_client.recv().await.unwrap();
    let Frame::RoomEnvelope(envelope) = next else { panic!("expected room envelope") };
    assert!(envelope.ciphertext.len() < 64);

    handle.shutdown().await;
    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_direct_message_fails_without_echo() {
    let directory = MemoryDirectory::new();
    directory.register("bob", fixture_key_pair("bob").unwrap().public);
    let (setup, mut relay) = setup(directory);
    let (handle, runtime) = init_session(setup).await.unwrap();
    let runtime = tokio::spawn(runtime.run());
    let mut inbox = handle.subscribe();

    let result = handle.send_direct_message("bob", "x".repeat(400 * 1024)).await;
    assert!(matches!(
        result,
        Err(SessionError::InvalidEnvelope(ProtocolError::FrameTooLarge { .. }))
    ));

    assert!(inbox.try_recv().is_err());
    assert!(handle.history(Conversation::dm("bob")).await.unwrap().is_empty());
    let _join = relay.from_client.recv().await.unwrap();
    assert!(relay.from_client.try_recv().is_err());

    handle.shutdown().await;
    runtime.await.unwrap().unwrap();
}

#[tokio::test]
async fn refused_direct_message_is_never_echoed() {
    let directory = MemoryDirectory::new();
    directory.register("bob", fixture_key_pair("bob").unwrap().public);
    let (setup, relay) = setup(directory);
    let (handle, runtime) = init_session(setup).await.unwrap();
    let mut inbox = handle.subscribe();

    // The relay stops reading; inbound stays open so only the send can fail
    let RelayEnd { to_client, from_client } = relay;
    drop(from_client);
    let runtime = tokio::spawn(runtime.run());

    let result = handle.send_direct_message("bob", "lost").await;
    assert!(matches!(result, Err(SessionError::Transport { .. })));

    let outcome = runtime.await.unwrap();
    assert!(matches!(&outcome, Err(e) if e.is_transient()));
    assert!(matches!(inbox.try_recv(), Err(TryRecvError::Empty)));
    drop(to_client);
}
