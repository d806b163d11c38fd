//! Runtime error types.

use sealroom_client::{KeyStoreError, SessionError};
use thiserror::Error;

/// Errors that end initialization or the runtime itself.
///
/// Per-message and per-send failures never surface here; they are logged
/// (inbound) or returned to the caller of the send (outbound).
#[derive(Error, Debug)]
pub enum AppError {
    /// The session could not be created (e.g. RoomKey derivation failed).
    #[error("session setup failed: {0}")]
    Session(#[from] SessionError),

    /// The local key store could not be read.
    #[error("key store: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// The relay connection failed or closed.
    #[error("transport: {reason}")]
    Transport {
        /// Description of the failure
        reason: String,
    },
}

impl AppError {
    /// Returns true if reconnecting may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
