//! Property-based tests for the handshake primitives
//!
//! These tests verify the invariants the handshake relies on:
//!
//! 1. **Agreement symmetry**: ECDH(a, B) == ECDH(b, A) for all keypairs
//! 2. **Determinism**: HKDF yields identical session keys for identical secrets
//! 3. **Round-trip**: decrypt(encrypt(m)) == m for all messages
//! 4. **Authenticity**: a different key never yields plaintext
//! 5. **Binding**: flipping any bit of a signed payload breaks verification

use cipherchat_crypto::{
    AeadKey, EphemeralKeyPair, IV_SIZE, IdentityAlgorithm, IdentityKeyPair, decrypt,
    derive_session_key, encrypt, sign, verify,
};
use proptest::prelude::*;
use rand_core::OsRng;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_agreement_is_symmetric(_case in 0u8..u8::MAX) {
        let a = EphemeralKeyPair::generate(&mut OsRng);
        let b = EphemeralKeyPair::generate(&mut OsRng);
        let a_public = a.public_key_bytes();
        let b_public = b.public_key_bytes();

        let from_a = a.agree(&b_public).unwrap();
        let from_b = b.agree(&a_public).unwrap();

        prop_assert_eq!(from_a.as_bytes(), from_b.as_bytes());
        prop_assert_eq!(derive_session_key(&from_a), derive_session_key(&from_b));
    }

    #[test]
    fn prop_aead_roundtrip(
        key in any::<[u8; 32]>(),
        iv in any::<[u8; IV_SIZE]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let key = AeadKey::from_bytes(key);
        let ciphertext = encrypt(&key, &iv, &plaintext);

        prop_assert_eq!(decrypt(&key, &iv, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn prop_wrong_key_never_decrypts(
        key in any::<[u8; 32]>(),
        other in any::<[u8; 32]>(),
        iv in any::<[u8; IV_SIZE]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(key != other);

        let ciphertext = encrypt(&AeadKey::from_bytes(key), &iv, &plaintext);
        prop_assert!(decrypt(&AeadKey::from_bytes(other), &iv, &ciphertext).is_err());
    }

    #[test]
    fn prop_any_bit_flip_breaks_signature(byte in 0usize..65, bit in 0u8..8) {
        let identity = IdentityKeyPair::generate(IdentityAlgorithm::EcdsaP256, &mut OsRng).unwrap();
        let ephemeral = EphemeralKeyPair::generate(&mut OsRng).public_key_bytes();
        let signature = sign(&identity, &ephemeral, &mut OsRng).unwrap();

        let mut tampered_key = ephemeral.clone();
        tampered_key[byte] ^= 1 << bit;
        prop_assert!(!verify(identity.public_key(), &tampered_key, &signature));

        let mut tampered_signature = signature.clone();
        tampered_signature[byte % signature.len()] ^= 1 << bit;
        prop_assert!(!verify(identity.public_key(), &ephemeral, &tampered_signature));

        prop_assert!(verify(identity.public_key(), &ephemeral, &signature));
    }
}
