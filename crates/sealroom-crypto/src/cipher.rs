//! Message encryption using AES-256-GCM.
//!
//! All functions are pure - the IV must be provided by the caller. The session
//! draws a fresh random IV from its environment for every message; an IV must
//! never be reused with the same key.
//!
//! Ciphertext layout matches WebCrypto: the 16-byte tag is appended to the
//! encrypted bytes.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CryptoError, key::SymmetricKey};

/// Size of the AES-GCM IV (96 bits).
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits).
pub const TAG_SIZE: usize = 16;

/// Ciphertext plus the IV it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// Encrypted bytes with the authentication tag appended
    pub ciphertext: Vec<u8>,
    /// The 12-byte IV
    pub iv: [u8; IV_SIZE],
}

impl SealedMessage {
    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(TAG_SIZE)
    }
}

/// Encrypt `plaintext` under `key` with the caller-provided `iv`.
///
/// # Security
///
/// - Caller MUST provide a fresh random IV per call
/// - Authenticated encryption prevents tampering
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, iv: [u8; IV_SIZE]) -> SealedMessage {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&iv), plaintext) else {
        unreachable!("AES-256-GCM encryption cannot fail below the 64 GiB message limit");
    };

    SealedMessage { ciphertext, iv }
}

/// Decrypt a sealed message.
///
/// # Errors
///
/// - `Decryption`: wrong key, corrupted ciphertext or truncated tag. The
///   cases are indistinguishable on purpose.
pub fn decrypt(sealed: &SealedMessage, key: &SymmetricKey) -> Result<Vec<u8>, CryptoError> {
    decrypt_parts(&sealed.ciphertext, &sealed.iv, key)
}

/// Decrypt from borrowed envelope fields without building a
/// [`SealedMessage`].
pub fn decrypt_parts(
    ciphertext: &[u8],
    iv: &[u8; IV_SIZE],
    key: &SymmetricKey,
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Decryption);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher.decrypt(Nonce::from_slice(iv), ciphertext).map_err(|_| CryptoError::Decryption)
}
