//! Client
//!
//! Action-based session state machine for Sealroom: end-to-end encrypted room
//! broadcasts under a shared RoomKey, and direct messages under per-peer
//! session keys wrapped with the recipient's RSA public key.
//!
//! # Architecture
//!
//! The session is Sans-IO. It receives events ([`SessionEvent`]), processes
//! them through pure state machine logic, and returns actions
//! ([`SessionAction`]) for the caller to execute. Time and randomness come
//! from an injected [`Environment`], so tests control the dedup window and
//! every nonce.
//!
//! # Components
//!
//! - [`Session`]: per-user state machine owning all key material
//! - [`DmSessionStore`]: per-peer session keys and their state
//! - [`SessionConfig`]: derivation parameters and limits
//! - [`KeyDirectory`]: public-key lookup collaborator
//! - [`LocalKeyStore`]: durable key pair storage collaborator
//!
//! # HTTP directory (optional)
//!
//! With the `http` feature enabled, this crate also provides
//! `HttpKeyDirectory`, which talks to the account server's REST API.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
pub mod directory;
mod dm_store;
mod error;
mod event;
pub mod keystore;
mod session;

pub use config::{
    DEFAULT_MAX_PENDING_UNWRAPS, DEFAULT_ROOM_PASSPHRASE, DEFAULT_ROOM_SALT, SessionConfig,
};
#[cfg(feature = "http")]
pub use directory::HttpKeyDirectory;
pub use directory::KeyDirectory;
pub use dm_store::{DmSessionStore, PeerState};
pub use error::{DirectoryError, KeyStoreError, SessionError};
pub use event::{SendId, SessionAction, SessionEvent};
pub use keystore::{FileKeyStore, LocalKeyStore, MemoryKeyStore, StoredKeyPair, provision};
pub use sealroom_core::{Conversation, ConversationKind, DecryptedMessage, Environment};
pub use session::Session;
