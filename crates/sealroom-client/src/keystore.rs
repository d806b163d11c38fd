//! Local key store: durable storage of the account's RSA key pair.
//!
//! The session only ever reads from the store. Writing happens once, during
//! key provisioning (`sealroom keygen`), outside the session's common path.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use sealroom_crypto::{KeyPair, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::KeyStoreError;

/// Serialized key pair: base64 SPKI public key, base64 PKCS#8 private key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyPair {
    /// Base64 SPKI DER
    pub public_key: String,
    /// Base64 PKCS#8 DER
    pub private_key: String,
}

impl StoredKeyPair {
    /// Encode a key pair for storage.
    pub fn from_key_pair(pair: &KeyPair) -> Result<Self, KeyStoreError> {
        Ok(Self {
            public_key: pair.public.to_base64()?,
            private_key: pair.private.to_base64()?.to_string(),
        })
    }

    /// Parse the stored private key.
    pub fn private_key(&self) -> Result<PrivateKey, KeyStoreError> {
        Ok(PrivateKey::from_base64(&self.private_key)?)
    }

    /// Parse the stored public key.
    pub fn public_key(&self) -> Result<PublicKey, KeyStoreError> {
        Ok(PublicKey::from_base64(&self.public_key)?)
    }
}

impl std::fmt::Debug for StoredKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Durable per-user key storage.
pub trait LocalKeyStore: Send + Sync {
    /// Read the stored key pair, if any.
    fn load(&self) -> Result<Option<StoredKeyPair>, KeyStoreError>;

    /// Persist the key pair, replacing any previous one.
    fn save(&self, pair: &StoredKeyPair) -> Result<(), KeyStoreError>;
}

/// Key pair stored as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalKeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<StoredKeyPair>, KeyStoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, pair: &StoredKeyPair) -> Result<(), KeyStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so a crash never leaves a truncated key file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(pair)?)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// In-memory key store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    pair: Mutex<Option<StoredKeyPair>>,
}

impl MemoryKeyStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `pair`.
    pub fn with_pair(pair: StoredKeyPair) -> Self {
        Self { pair: Mutex::new(Some(pair)) }
    }
}

impl LocalKeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<StoredKeyPair>, KeyStoreError> {
        let guard = self.pair.lock().unwrap_or_else(PoisonError::into_inner);
        Ok((*guard).clone())
    }

    fn save(&self, pair: &StoredKeyPair) -> Result<(), KeyStoreError> {
        let mut guard = self.pair.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(pair.clone());
        Ok(())
    }
}

/// Load the key pair from `store`, generating and saving one if absent.
///
/// Returns the pair and whether it was newly generated (and so still needs
/// uploading to the key directory).
pub fn provision(
    store: &dyn LocalKeyStore,
    seed: [u8; sealroom_crypto::RNG_SEED_SIZE],
) -> Result<(KeyPair, bool), KeyStoreError> {
    if let Some(stored) = store.load()? {
        return Ok((KeyPair::from_private(stored.private_key()?), false));
    }

    let pair = KeyPair::generate(seed)?;
    store.save(&StoredKeyPair::from_key_pair(&pair)?)?;
    Ok((pair, true))
}
