//! Application layer for Sealroom
//!
//! Async runtime around the Sans-IO [`sealroom_client::Session`]. A single
//! dispatcher task owns the session; callers talk to it through a cloneable
//! [`SessionHandle`], and the relay connection is a pair of frame channels.
//!
//! # Components
//!
//! - [`init_session`]: derive keys, load the private key, announce to the relay
//! - [`Runtime`]: dispatcher loop (commands, relay frames, key lookups)
//! - [`SessionHandle`]: send, subscribe, query history, shut down
//! - [`Transport`]: frame channels, in-memory or over a byte stream
//! - [`SystemEnv`]: real clock and OS randomness
//!
//! # TCP (optional)
//!
//! With the `tcp` feature enabled, `connect_tcp` opens a newline-delimited
//! JSON connection to a relay.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod handle;
mod runtime;
mod system_env;
mod transport;

pub use error::AppError;
pub use handle::SessionHandle;
pub use runtime::{Runtime, SessionSetup, init_session};
pub use system_env::SystemEnv;
#[cfg(feature = "tcp")]
pub use transport::connect_tcp;
pub use transport::{CHANNEL_CAPACITY, RelayEnd, StreamTask, Transport};
