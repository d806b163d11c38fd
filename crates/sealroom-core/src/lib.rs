//! Sealroom core.
//!
//! Pieces shared by the session state machine and its drivers:
//!
//! - [`Environment`]: injectable clock and randomness
//! - [`DecryptedMessage`] and [`Conversation`]: what the caller sees
//! - [`Reconciler`]: per-conversation logs with duplicate suppression

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod message;
pub mod reconciler;

pub use env::{Environment, VirtualInstant};
pub use message::{Conversation, ConversationKind, DecryptedMessage};
pub use reconciler::{Admission, DEFAULT_DEDUP_WINDOW, DedupPolicy, Reconciler};
