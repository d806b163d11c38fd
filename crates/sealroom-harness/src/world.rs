//! Simulated world: one relay, one directory, one clock, many clients.
//!
//! Each joined client runs the production [`sealroom_app::Runtime`] against
//! the in-memory relay, so scenarios exercise the same dispatcher, session
//! and reconciler code as a real deployment. Only time, randomness and the
//! network are simulated.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock, PoisonError},
    time::Duration,
};

use sealroom_app::{AppError, SessionHandle, SessionSetup, init_session};
use sealroom_client::{MemoryKeyStore, SessionConfig, StoredKeyPair};
use sealroom_core::{DecryptedMessage, VirtualInstant};
use sealroom_crypto::{CryptoError, KeyPair, RNG_SEED_SIZE};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::{MemoryDirectory, SimEnv, SimRelay};

/// How long a client waits for a message before giving up.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Deterministic RSA key pair for `username`, generated once per process.
///
/// RSA-2048 generation is slow; scenarios reuse the same pairs.
pub fn fixture_key_pair(username: &str) -> Result<KeyPair, CryptoError> {
    static CACHE: OnceLock<Mutex<HashMap<String, KeyPair>>> = OnceLock::new();

    let cache = CACHE.get_or_init(Mutex::default);
    if let Some(pair) = cache.lock().unwrap_or_else(PoisonError::into_inner).get(username) {
        return Ok(pair.clone());
    }

    let mut seed = [0u8; RNG_SEED_SIZE];
    for (slot, byte) in seed.iter_mut().zip(username.bytes()) {
        *slot = byte;
    }
    let pair = KeyPair::generate(seed)?;

    cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(username.to_string(), pair.clone());
    Ok(pair)
}

/// Shared infrastructure for a scenario.
#[derive(Debug)]
pub struct SimWorld {
    /// Clock and RNG shared by every client
    pub env: SimEnv,
    /// Relay all clients connect to
    pub relay: SimRelay,
    /// Public-key directory all clients query
    pub directory: MemoryDirectory,
    config: SessionConfig,
}

impl SimWorld {
    /// World with the default session configuration.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, SessionConfig::default())
    }

    /// World whose clients all use `config`.
    pub fn with_config(seed: u64, config: SessionConfig) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            relay: SimRelay::new(),
            directory: MemoryDirectory::new(),
            config,
        }
    }

    /// Replace the directory (e.g. one with latency).
    #[must_use]
    pub fn with_directory(mut self, directory: MemoryDirectory) -> Self {
        self.directory = directory;
        self
    }

    /// Provision `username`, publish its public key and connect it.
    pub async fn join(&self, username: &str) -> Result<SimClient, AppError> {
        let pair = fixture_key_pair(username).map_err(sealroom_client::KeyStoreError::from)?;
        let store = MemoryKeyStore::with_pair(StoredKeyPair::from_key_pair(&pair)?);
        self.directory.register(username, pair.public.clone());
        self.connect(username, store).await
    }

    /// Connect `username` with a published public key but an empty local key
    /// store, as on a device that has not restored its key yet.
    pub async fn join_without_private_key(&self, username: &str) -> Result<SimClient, AppError> {
        let pair = fixture_key_pair(username).map_err(sealroom_client::KeyStoreError::from)?;
        self.directory.register(username, pair.public);
        self.connect(username, MemoryKeyStore::new()).await
    }

    /// Connect `username` without publishing anything.
    pub async fn connect(
        &self,
        username: &str,
        key_store: MemoryKeyStore,
    ) -> Result<SimClient, AppError> {
        let setup = SessionSetup {
            env: self.env.clone(),
            username: username.to_string(),
            config: self.config.clone(),
            key_store: Arc::new(key_store),
            directory: Arc::new(self.directory.clone()),
            transport: self.relay.connect(),
        };

        let (handle, runtime) = init_session(setup).await?;
        let messages = handle.subscribe();
        let runtime = tokio::spawn(runtime.run());

        // Routing only starts once the relay has processed the join
        while !self.relay.joined().iter().any(|name| name == username) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        Ok(SimClient { username: username.to_string(), handle, messages, runtime })
    }
}

/// A connected client and its running runtime.
pub struct SimClient {
    /// Local username
    pub username: String,
    /// Caller handle
    pub handle: SessionHandle<VirtualInstant>,
    messages: broadcast::Receiver<DecryptedMessage<VirtualInstant>>,
    runtime: JoinHandle<Result<(), AppError>>,
}

impl SimClient {
    /// Next admitted message, or `None` on timeout or shutdown.
    pub async fn next_message(&mut self) -> Option<DecryptedMessage<VirtualInstant>> {
        loop {
            match tokio::time::timeout(DELIVERY_TIMEOUT, self.messages.recv()).await {
                Ok(Ok(message)) => return Some(message),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(user = %self.username, skipped, "subscriber lagged");
                },
                Ok(Err(RecvError::Closed)) | Err(_) => return None,
            }
        }
    }

    /// Skip messages until one with `text` arrives.
    pub async fn wait_for(&mut self, text: &str) -> Option<DecryptedMessage<VirtualInstant>> {
        while let Some(message) = self.next_message().await {
            if message.text == text {
                return Some(message);
            }
        }
        None
    }

    /// True once the runtime task has exited.
    pub fn is_stopped(&self) -> bool {
        self.runtime.is_finished()
    }

    /// Shut down and wait for the runtime to exit.
    pub async fn stop(self) -> Result<(), AppError> {
        self.handle.shutdown().await;
        self.runtime
            .await
            .unwrap_or_else(|e| Err(AppError::Transport { reason: format!("runtime task: {e}") }))
    }
}
