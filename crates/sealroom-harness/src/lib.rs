//! Deterministic simulation harness for Sealroom.
//!
//! In-memory implementations of the runtime's collaborators for reproducible
//! end-to-end testing: a seeded [`SimEnv`], a [`SimRelay`] that routes frames
//! like the production relay (and can redeliver them), and a
//! [`MemoryDirectory`] that can go offline. [`SimWorld`] wires them to real
//! session runtimes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod directory;
pub mod sim_env;
pub mod sim_relay;
pub mod world;

pub use directory::MemoryDirectory;
pub use sim_env::SimEnv;
pub use sim_relay::SimRelay;
pub use world::{DELIVERY_TIMEOUT, SimClient, SimWorld, fixture_key_pair};
