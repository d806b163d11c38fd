//! Room key derivation using PBKDF2-HMAC-SHA256.

use hmac::Hmac;
use sha2::Sha256;

use crate::{
    error::CryptoError,
    key::{KEY_SIZE, SymmetricKey},
};

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Derive the shared RoomKey from a passphrase and salt.
///
/// Both are taken as UTF-8 bytes so every client derives the same key from
/// the same configuration, with no out-of-band exchange.
///
/// # Security
///
/// - Deterministic: same inputs always produce the same key
/// - Slow and salted to resist brute force on weak passphrases
///
/// # Errors
///
/// - `KeyDerivation`: zero iterations
///
/// An empty passphrase is accepted; it yields a valid but guessable key.
pub fn derive_room_key(
    passphrase: &str,
    salt: &str,
    iterations: u32,
) -> Result<SymmetricKey, CryptoError> {
    if iterations == 0 {
        return Err(CryptoError::KeyDerivation {
            reason: "iteration count must be positive".to_string(),
        });
    }

    let mut derived = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(passphrase.as_bytes(), salt.as_bytes(), iterations, &mut derived)
        .map_err(|e| CryptoError::KeyDerivation { reason: e.to_string() })?;

    Ok(SymmetricKey::from_bytes(derived))
}
