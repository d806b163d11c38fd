//! Session key wrapping using RSA-OAEP (SHA-256, MGF1-SHA256, empty label).
//!
//! A DM session key travels inside every direct message, wrapped under the
//! recipient's public key so only the holder of the matching private key can
//! recover it. Public keys are exchanged as base64 SPKI DER, private keys are
//! stored as base64 PKCS#8 DER.
//!
//! OAEP padding and key generation need randomness. As elsewhere in this
//! crate the caller supplies it, here as a 32-byte seed for a ChaCha20 CSPRNG.

use base64::{Engine, engine::general_purpose::STANDARD};
use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng};
use rsa::{
    Oaep, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{
    error::{CryptoError, UnwrapFailure},
    key::{KEY_SIZE, SymmetricKey},
};

/// RSA modulus size for generated key pairs.
pub const RSA_MODULUS_BITS: usize = 2048;

/// Size of the seed callers provide for OAEP padding or key generation.
pub const RNG_SEED_SIZE: usize = 32;

/// A peer's RSA public key, as published in the key directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse SPKI DER bytes.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        RsaPublicKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey { reason: format!("bad SPKI public key: {e}") })
    }

    /// Parse base64-encoded SPKI DER, the key directory format.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey { reason: format!("bad base64: {e}") })?;
        Self::from_spki_der(&der)
    }

    /// Encode as SPKI DER.
    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })
    }

    /// Encode as base64 SPKI DER.
    pub fn to_base64(&self) -> Result<String, CryptoError> {
        self.to_spki_der().map(|der| STANDARD.encode(der))
    }
}

/// The local user's RSA private key.
///
/// Shared read-only across every inbound DM unwrap. `Debug` is redacted.
#[derive(Clone)]
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    /// Parse PKCS#8 DER bytes.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        RsaPrivateKey::from_pkcs8_der(der)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey { reason: format!("bad PKCS#8 private key: {e}") })
    }

    /// Parse base64-encoded PKCS#8 DER, the key store format.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let der = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|e| CryptoError::InvalidKey { reason: format!("bad base64: {e}") })?,
        );
        Self::from_pkcs8_der(&der)
    }

    /// Encode as base64 PKCS#8 DER.
    pub fn to_base64(&self) -> Result<Zeroizing<String>, CryptoError> {
        let der = self
            .0
            .to_pkcs8_der()
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;
        Ok(Zeroizing::new(STANDARD.encode(der.as_bytes())))
    }

    /// Matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// An RSA key pair, generated once per account by key provisioning.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Public half, uploaded to the key directory
    pub public: PublicKey,
    /// Private half, kept in the local key store
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generate a 2048-bit key pair (public exponent 65537).
    ///
    /// Caller MUST provide a cryptographically secure seed in production.
    pub fn generate(seed: [u8; RNG_SEED_SIZE]) -> Result<Self, CryptoError> {
        let mut rng = ChaCha20Rng::from_seed(seed);
        let private = RsaPrivateKey::new(&mut rng, RSA_MODULUS_BITS)
            .map_err(|e| CryptoError::InvalidKey { reason: format!("key generation: {e}") })?;
        let public = private.to_public_key();

        Ok(Self { public: PublicKey(public), private: PrivateKey(private) })
    }

    /// Rebuild a key pair from a stored private key.
    pub fn from_private(private: PrivateKey) -> Self {
        Self { public: private.public_key(), private }
    }
}

/// Wrap a session key under the recipient's public key.
///
/// `seed` drives the OAEP padding; two wraps of the same key with different
/// seeds produce different ciphertexts.
pub fn wrap_key(
    key: &SymmetricKey,
    recipient: &PublicKey,
    seed: [u8; RNG_SEED_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let mut rng = ChaCha20Rng::from_seed(seed);
    recipient
        .0
        .encrypt(&mut rng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Wrap { reason: e.to_string() })
}

/// Recover a session key with the local private key.
///
/// # Errors
///
/// - `Unwrap { MissingPrivateKey }`: no private key loaded (retryable)
/// - `Unwrap { Mismatch }`: wrong private key or corrupted blob
/// - `Unwrap { InvalidKeyLength }`: recovered material is not 32 bytes
pub fn unwrap_key(
    wrapped: &[u8],
    own_private_key: Option<&PrivateKey>,
) -> Result<SymmetricKey, CryptoError> {
    let Some(private_key) = own_private_key else {
        return Err(CryptoError::Unwrap { reason: UnwrapFailure::MissingPrivateKey });
    };

    let raw = Zeroizing::new(
        private_key
            .0
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::Unwrap { reason: UnwrapFailure::Mismatch })?,
    );

    if raw.len() != KEY_SIZE {
        return Err(CryptoError::Unwrap {
            reason: UnwrapFailure::InvalidKeyLength { len: raw.len() },
        });
    }

    SymmetricKey::from_slice(&raw)
}
