//! Property-based tests for the cipher engine and key derivation.
//!
//! These complement the unit tests with arbitrary inputs:
//! - Round-trip for any plaintext, key and IV
//! - Fresh IVs give distinct ciphertexts for identical plaintext
//! - A different key never yields a plausible plaintext
//! - Derivation is a pure function of its inputs

use proptest::prelude::*;
use sealroom_crypto::{
    CryptoError, IV_SIZE, KEY_SIZE, SymmetricKey, TAG_SIZE, decrypt, derive_room_key, encrypt,
};

fn key_strategy() -> impl Strategy<Value = [u8; KEY_SIZE]> {
    prop::array::uniform32(any::<u8>())
}

fn iv_strategy() -> impl Strategy<Value = [u8; IV_SIZE]> {
    prop::array::uniform12(any::<u8>())
}

proptest! {
    #[test]
    fn prop_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        key in key_strategy(),
        iv in iv_strategy(),
    ) {
        let key = SymmetricKey::from_bytes(key);
        let sealed = encrypt(&plaintext, &key, iv);

        prop_assert_eq!(sealed.ciphertext.len(), plaintext.len() + TAG_SIZE);
        prop_assert_eq!(decrypt(&sealed, &key)?, plaintext);
    }

    #[test]
    fn prop_distinct_ivs_distinct_ciphertexts(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        key in key_strategy(),
        iv_a in iv_strategy(),
        iv_b in iv_strategy(),
    ) {
        prop_assume!(iv_a != iv_b);
        let key = SymmetricKey::from_bytes(key);

        let a = encrypt(&plaintext, &key, iv_a);
        let b = encrypt(&plaintext, &key, iv_b);

        prop_assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn prop_wrong_key_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        key in key_strategy(),
        other in key_strategy(),
        iv in iv_strategy(),
    ) {
        prop_assume!(key != other);
        let sealed = encrypt(&plaintext, &SymmetricKey::from_bytes(key), iv);

        prop_assert_eq!(decrypt(&sealed, &SymmetricKey::from_bytes(other)), Err(CryptoError::Decryption));
    }

    #[test]
    fn prop_any_bit_flip_is_rejected(
        plaintext in prop::collection::vec(any::<u8>(), 1..256),
        key in key_strategy(),
        iv in iv_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let key = SymmetricKey::from_bytes(key);
        let mut sealed = encrypt(&plaintext, &key, iv);
        let index = position.index(sealed.ciphertext.len());
        sealed.ciphertext[index] ^= 1 << bit;

        prop_assert_eq!(decrypt(&sealed, &key), Err(CryptoError::Decryption));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_derivation_is_deterministic(
        passphrase in "[a-zA-Z0-9 -]{1,32}",
        salt in "[a-zA-Z0-9_]{0,32}",
        iterations in 1u32..64,
    ) {
        let a = derive_room_key(&passphrase, &salt, iterations)?;
        let b = derive_room_key(&passphrase, &salt, iterations)?;

        prop_assert_eq!(a.as_bytes(), b.as_bytes());
    }
}

#[test]
fn derived_room_keys_decrypt_each_others_ciphertexts() {
    let alice_key = derive_room_key("shared-room-secret", "fixed_salt_for_demo", 100_000).unwrap();
    let bob_key = derive_room_key("shared-room-secret", "fixed_salt_for_demo", 100_000).unwrap();

    let sealed = encrypt(b"hello", &alice_key, [3; IV_SIZE]);
    assert_eq!(decrypt(&sealed, &bob_key).unwrap(), b"hello");

    let reply = encrypt(b"hi alice", &bob_key, [4; IV_SIZE]);
    assert_eq!(decrypt(&reply, &alice_key).unwrap(), b"hi alice");
}
