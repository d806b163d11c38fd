//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness). The
//! runtime uses the real clock and OS entropy; tests and the simulation
//! harness use a virtual clock and a seeded RNG so dedup windows and key
//! material are reproducible.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, simulations use
    /// [`VirtualInstant`].
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG in production
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Random array of `N` bytes.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

/// Instant on a virtual clock: elapsed time since the simulation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualInstant(Duration);

impl VirtualInstant {
    /// The simulation epoch.
    pub const EPOCH: Self = Self(Duration::ZERO);

    /// Time elapsed since the epoch.
    pub fn since_epoch(self) -> Duration {
        self.0
    }
}

impl Sub for VirtualInstant {
    type Output = Duration;

    /// Saturates at zero, matching `std::time::Instant`.
    fn sub(self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, delta: Duration) -> Self {
        Self(self.0 + delta)
    }
}

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use super::{Duration, Environment, VirtualInstant};

    /// Deterministic environment with a manually advanced clock.
    ///
    /// Randomness is a splitmix64 stream: reproducible, NOT secure. Clones
    /// share the clock and the stream.
    #[derive(Debug, Clone)]
    pub struct MockEnv {
        nanos: Arc<AtomicU64>,
        state: Arc<AtomicU64>,
    }

    impl MockEnv {
        /// Environment at the epoch with the given seed.
        pub fn with_seed(seed: u64) -> Self {
            Self { nanos: Arc::new(AtomicU64::new(0)), state: Arc::new(AtomicU64::new(seed)) }
        }

        /// Move the clock forward.
        pub fn advance(&self, delta: Duration) {
            self.nanos.fetch_add(delta.as_nanos() as u64, Ordering::SeqCst);
        }

        fn next_u64(&self) -> u64 {
            let mut z = self
                .state
                .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::SeqCst)
                .wrapping_add(0x9E37_79B9_7F4A_7C15);
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        }
    }

    impl Default for MockEnv {
        fn default() -> Self {
            Self::with_seed(0)
        }
    }

    impl Environment for MockEnv {
        type Instant = VirtualInstant;

        fn now(&self) -> VirtualInstant {
            VirtualInstant::EPOCH + Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for chunk in buffer.chunks_mut(8) {
                let word = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&word[..chunk.len()]);
            }
        }
    }
}
