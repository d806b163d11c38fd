//! Protocol error types.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or validating wire frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame exceeds [`crate::MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Bytes are not a well-formed JSON frame.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Frame decoded but violates an envelope invariant.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Name of the wire field
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Frame could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}
