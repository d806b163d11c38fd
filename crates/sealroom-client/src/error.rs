//! Error types for the session layer and its collaborators.
//!
//! Every session error is scoped to the single message or send that caused
//! it. None of them invalidate the RoomKey or the DM session map.

use sealroom_crypto::{CryptoError, UnwrapFailure};
use sealroom_proto::ProtocolError;
use thiserror::Error;

/// Errors from [`crate::Session`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// RoomKey derivation failed. Room messaging cannot proceed.
    #[error("room key derivation failed: {reason}")]
    KeyDerivation {
        /// Description of the failure
        reason: String,
    },

    /// Ciphertext did not authenticate. The message is dropped.
    #[error("message could not be decrypted")]
    Decryption,

    /// The DM session key carried by an envelope could not be unwrapped.
    #[error("session key unwrap failed: {reason}")]
    Unwrap {
        /// Why the unwrap failed
        reason: UnwrapFailure,
        /// True if loading the private key would let a retry succeed
        retryable: bool,
    },

    /// The recipient's public key could not be resolved or used.
    #[error("public key for {peer} unavailable: {reason}")]
    PeerKeyUnavailable {
        /// Peer the send was addressed to
        peer: String,
        /// Description of the failure
        reason: String,
    },

    /// The relay connection failed.
    #[error("transport error: {reason}")]
    Transport {
        /// Description of the failure
        reason: String,
    },

    /// An envelope (inbound or about to be sent) violates a wire invariant.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] ProtocolError),

    /// Whitespace-only text is never sent.
    #[error("message is empty")]
    EmptyMessage,

    /// A DM envelope addressed to someone else reached us.
    #[error("direct message addressed to {recipient}")]
    Misaddressed {
        /// Recipient named in the envelope
        recipient: String,
    },

    /// The session has shut down.
    #[error("session closed")]
    Closed,
}

impl SessionError {
    /// Returns true if the operation may succeed on retry.
    ///
    /// Missing private keys, unreachable directories and dropped connections
    /// are transient. Authentication failures and bad derivation parameters
    /// are not; retrying the same input yields the same failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unwrap { retryable, .. } => *retryable,
            Self::PeerKeyUnavailable { .. } | Self::Transport { .. } => true,
            Self::KeyDerivation { .. }
            | Self::Decryption
            | Self::InvalidEnvelope(_)
            | Self::EmptyMessage
            | Self::Misaddressed { .. }
            | Self::Closed => false,
        }
    }

    /// Map a crypto failure onto the session taxonomy.
    pub(crate) fn from_crypto(error: CryptoError) -> Self {
        match error {
            CryptoError::Unwrap { reason } => {
                Self::Unwrap { reason, retryable: reason == UnwrapFailure::MissingPrivateKey }
            },
            CryptoError::KeyDerivation { reason } => Self::KeyDerivation { reason },
            CryptoError::Decryption | CryptoError::Wrap { .. } | CryptoError::InvalidKey { .. } => {
                Self::Decryption
            },
        }
    }
}

/// Errors from a [`crate::KeyDirectory`] lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory has no key for this user.
    #[error("no public key registered for {username}")]
    NotFound {
        /// Username that was looked up
        username: String,
    },

    /// The directory answered with a non-success status.
    #[error("directory returned status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The directory could not be reached.
    #[error("directory unreachable: {reason}")]
    Unreachable {
        /// Description of the failure
        reason: String,
    },

    /// The directory returned a key that does not parse.
    #[error("directory returned an invalid key: {reason}")]
    InvalidKey {
        /// Description of the failure
        reason: String,
    },
}

/// Errors from a [`crate::LocalKeyStore`].
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// Reading or writing the backing file failed.
    #[error("key store I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document is not valid JSON of the expected shape.
    #[error("key store format: {0}")]
    Format(#[from] serde_json::Error),

    /// The stored key material does not parse.
    #[error("stored key is invalid: {0}")]
    InvalidKey(#[from] CryptoError),
}
