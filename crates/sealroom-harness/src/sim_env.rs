//! Simulation environment: seeded RNG and a manually advanced clock.

use std::{
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand_chacha::{
    ChaCha20Rng,
    rand_core::{RngCore, SeedableRng},
};
use sealroom_core::{Environment, VirtualInstant};

/// Deterministic [`Environment`] for simulation tests.
///
/// ChaCha20 seeded from a `u64`, so every IV, session key and OAEP seed is
/// reproducible. The clock only moves on [`SimEnv::advance`]. Clones share
/// both the clock and the RNG stream, so all clients in one world agree on
/// the time.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    nanos: Arc<AtomicU64>,
}

impl SimEnv {
    /// Environment with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with the given seed, clock at the epoch.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, delta: Duration) {
        self.nanos.fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Time elapsed since the epoch.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEnv").field("elapsed", &self.elapsed()).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    type Instant = VirtualInstant;

    fn now(&self) -> VirtualInstant {
        VirtualInstant::EPOCH + self.elapsed()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
