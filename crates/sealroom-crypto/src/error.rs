//! Error types for cryptographic operations.

use thiserror::Error;

/// Why a wrapped session key could not be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapFailure {
    /// No private key is loaded yet. Retry once provisioning has run.
    MissingPrivateKey,
    /// The private key does not match, or the wrapped blob is corrupt.
    Mismatch,
    /// The unwrapped material is not a 256-bit key.
    InvalidKeyLength {
        /// Length of the recovered material in bytes
        len: usize,
    },
}

impl std::fmt::Display for UnwrapFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPrivateKey => f.write_str("private key not loaded"),
            Self::Mismatch => f.write_str("private key does not match wrapped key"),
            Self::InvalidKeyLength { len } => {
                write!(f, "unwrapped key is {len} bytes, expected 32")
            },
        }
    }
}

/// Errors from the cipher engine, key derivation and key wrap units.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Room key derivation failed. Fatal to room messaging.
    #[error("key derivation failed: {reason}")]
    KeyDerivation {
        /// Description of the failure
        reason: String,
    },

    /// Ciphertext did not authenticate under the given key.
    ///
    /// Deliberately carries no detail: a wrong key and tampered data are
    /// indistinguishable.
    #[error("decryption failed")]
    Decryption,

    /// Session key could not be unwrapped.
    #[error("key unwrap failed: {reason}")]
    Unwrap {
        /// Why the unwrap failed
        reason: UnwrapFailure,
    },

    /// Session key could not be wrapped for the recipient.
    #[error("key wrap failed: {reason}")]
    Wrap {
        /// Description of the failure
        reason: String,
    },

    /// Key material could not be parsed or encoded.
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Description of the failure
        reason: String,
    },
}

impl CryptoError {
    /// Returns true if the same operation may succeed later without new
    /// input, i.e. the private key was simply not loaded yet.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unwrap { reason: UnwrapFailure::MissingPrivateKey })
    }
}
