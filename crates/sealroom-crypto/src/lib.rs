//! Sealroom Cryptographic Primitives
//!
//! Cryptographic building blocks for Sealroom. Pure functions with
//! deterministic outputs. Callers provide random bytes (IVs, session keys,
//! RSA padding seeds) for deterministic testing.
//!
//! # Key Hierarchy
//!
//! Two independent trust models share one cipher engine:
//!
//! ```text
//! Room passphrase + salt                 Fresh random bytes (per peer)
//!        │                                        │
//!        ▼                                        ▼
//! PBKDF2-HMAC-SHA256 → RoomKey            DM session key ──► RSA-OAEP wrap
//!        │                                        │          (recipient SPKI)
//!        ▼                                        ▼
//! AES-256-GCM (fresh 96-bit IV) ◄─────────────────┘
//!        │
//!        ▼
//! Ciphertext + tag
//! ```
//!
//! # Security
//!
//! Confidentiality and integrity:
//! - AES-256-GCM authenticates every ciphertext; a failed tag is reported as
//!   an opaque [`CryptoError::Decryption`]
//! - A fresh random IV is required per message; IV reuse under one key breaks
//!   GCM
//!
//! Room channel:
//! - The RoomKey is a static shared secret known to every client with the
//!   same configuration. There is no forward secrecy on this channel.
//!
//! DM channel:
//! - Only the holder of the recipient's private key can unwrap the session
//!   key; the relay sees only wrapped keys and ciphertext
//! - Every DM carries its own wrap of the session key

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod derivation;
mod error;
mod key;
pub mod wrap;

pub use cipher::{IV_SIZE, SealedMessage, TAG_SIZE, decrypt, decrypt_parts, encrypt};
pub use derivation::{DEFAULT_ITERATIONS, derive_room_key};
pub use error::{CryptoError, UnwrapFailure};
pub use key::{KEY_SIZE, SymmetricKey};
pub use wrap::{KeyPair, PrivateKey, PublicKey, RNG_SEED_SIZE, unwrap_key, wrap_key};
