//! In-memory public-key directory.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use sealroom_client::{DirectoryError, KeyDirectory};
use sealroom_crypto::PublicKey;

/// Username to public key map with simulated outages and latency.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    keys: Arc<Mutex<HashMap<String, PublicKey>>>,
    offline: Arc<AtomicBool>,
    lookups: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl MemoryDirectory {
    /// Empty, reachable directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup by `latency` (tokio time).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Publish `username`'s public key.
    pub fn register(&self, username: impl Into<String>, key: PublicKey) {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).insert(username.into(), key);
    }

    /// While offline every lookup fails with `Unreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Lookups started so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyDirectory for MemoryDirectory {
    async fn public_key(&self, username: &str) -> Result<PublicKey, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unreachable { reason: "directory offline".to_string() });
        }

        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound { username: username.to_string() })
    }
}
