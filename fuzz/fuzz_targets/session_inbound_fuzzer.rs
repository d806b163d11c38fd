//! Fuzz target for the inbound session path (envelope → unwrap → decrypt → admit)
//!
//! # Strategy
//!
//! - Raw envelopes: arbitrary room and DM envelopes, addressed to us or not
//! - Genuine traffic: room messages encrypted under the shared room key,
//!   interleaved with the garbage
//! - Clock: arbitrary advances between deliveries
//! - Key arrival: the private key may show up midway (buffer replay)
//!
//! # Invariants
//!
//! - A rejected envelope leaves history and peer state untouched
//! - Every genuine room message is admitted, modulo the dedup window
//! - Buffered DMs never exceed the configured bound
//! - NEVER panic

#![no_main]

use std::{sync::OnceLock, time::Duration};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealroom_client::{Conversation, Session, SessionConfig, SessionEvent};
use sealroom_core::env::test_utils::MockEnv;
use sealroom_crypto::{KeyPair, derive_room_key, encrypt};
use sealroom_proto::{DmEnvelope, Envelope, RoomEnvelope};

const USERNAME: &str = "bob";
const MAX_PENDING: usize = 4;

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    start_with_key: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    RawRoom { room: String, sender: String, ciphertext: Vec<u8>, iv: [u8; 12] },
    RawDm { to_us: bool, sender: String, wrapped: Vec<u8>, ciphertext: Vec<u8>, iv: [u8; 12] },
    GenuineRoom { sender: u8, text: String, iv: [u8; 12] },
    Advance { millis: u16 },
    LoadKey,
}

fn keys() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| KeyPair::generate([11; 32]).expect("key generation"))
}

fn config() -> SessionConfig {
    SessionConfig {
        kdf_iterations: 1,
        max_pending_unwraps: MAX_PENDING,
        ..SessionConfig::default()
    }
}

fuzz_target!(|scenario: Scenario| {
    let env = MockEnv::with_seed(0);
    let private = scenario.start_with_key.then(|| keys().private.clone());
    let (mut session, _) =
        Session::new(env.clone(), USERNAME, config(), private).expect("session");

    let config = config();
    let room_key = derive_room_key(&config.room_passphrase, &config.room_salt, 1).expect("derive");
    let general = Conversation::room("general");

    for step in scenario.steps.into_iter().take(64) {
        match step {
            Step::RawRoom { room, sender, ciphertext, iv } => {
                let before = session.history(&Conversation::room(room.clone())).len();
                let envelope =
                    Envelope::Room(RoomEnvelope { room: room.clone(), sender, ciphertext, iv });
                if session.handle(SessionEvent::EnvelopeReceived(envelope)).is_err() {
                    assert_eq!(session.history(&Conversation::room(room)).len(), before);
                }
            },

            Step::RawDm { to_us, sender, wrapped, ciphertext, iv } => {
                let recipient = if to_us { USERNAME.to_string() } else { "mallory".to_string() };
                let state = session.peer_state(&sender);
                let envelope = Envelope::Dm(DmEnvelope {
                    sender: sender.clone(),
                    recipient,
                    wrapped_session_key: wrapped,
                    ciphertext,
                    iv,
                });
                if session.handle(SessionEvent::EnvelopeReceived(envelope)).is_err() {
                    assert_eq!(session.peer_state(&sender), state);
                }
            },

            Step::GenuineRoom { sender, text, iv } => {
                if text.trim().is_empty() {
                    continue;
                }
                let sealed = encrypt(text.as_bytes(), &room_key, iv);
                let envelope = Envelope::Room(RoomEnvelope {
                    room: "general".to_string(),
                    sender: format!("user{}", sender % 4),
                    ciphertext: sealed.ciphertext,
                    iv: sealed.iv,
                });

                let before = session.history(&general).len();
                session
                    .handle(SessionEvent::EnvelopeReceived(envelope))
                    .expect("genuine room traffic must be accepted");
                assert!(session.history(&general).len() <= before + 1);
            },

            Step::Advance { millis } => env.advance(Duration::from_millis(u64::from(millis))),

            Step::LoadKey => {
                let _ = session.handle(SessionEvent::PrivateKeyLoaded(keys().private.clone()));
                assert_eq!(session.pending_unwrap_count(), 0);
            },
        }

        assert!(session.pending_unwrap_count() <= MAX_PENDING);
    }
});
