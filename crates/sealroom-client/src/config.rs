//! Session configuration.

use std::{fmt, time::Duration};

use sealroom_core::DEFAULT_DEDUP_WINDOW;
use sealroom_crypto::DEFAULT_ITERATIONS;

/// Passphrase every stock client derives the RoomKey from.
pub const DEFAULT_ROOM_PASSPHRASE: &str = "shared-room-secret";

/// Salt every stock client derives the RoomKey with.
pub const DEFAULT_ROOM_SALT: &str = "fixed_salt_for_demo";

/// Inbound DMs buffered while the private key is not loaded.
pub const DEFAULT_MAX_PENDING_UNWRAPS: usize = 64;

/// Session configuration, injected at startup.
///
/// `Default` reproduces the parameters of the stock clients so a default
/// session interoperates with them.
#[derive(Clone)]
pub struct SessionConfig {
    /// Passphrase the RoomKey is derived from
    pub room_passphrase: String,
    /// Salt for RoomKey derivation
    pub room_salt: String,
    /// PBKDF2 iteration count
    pub kdf_iterations: u32,
    /// Trailing window for room-message deduplication
    pub dedup_window: Duration,
    /// Bound on DMs buffered while waiting for the private key
    pub max_pending_unwraps: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room_passphrase: DEFAULT_ROOM_PASSPHRASE.to_string(),
            room_salt: DEFAULT_ROOM_SALT.to_string(),
            kdf_iterations: DEFAULT_ITERATIONS,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            max_pending_unwraps: DEFAULT_MAX_PENDING_UNWRAPS,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("room_passphrase", &"<redacted>")
            .field("room_salt", &self.room_salt)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("dedup_window", &self.dedup_window)
            .field("max_pending_unwraps", &self.max_pending_unwraps)
            .finish()
    }
}
