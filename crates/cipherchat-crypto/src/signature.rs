//! Identity signatures over raw byte payloads.
//!
//! The algorithm is chosen by the key: ECDSA-P256/SHA-256 producing a 64-byte
//! `r || s` signature, or RSA-PSS/SHA-256 with a 32-byte salt.

use p256::ecdsa::{
    self,
    signature::{Signer as _, Verifier as _},
};
use rand_core::CryptoRngCore;
use rsa::{
    pss,
    signature::{RandomizedSigner as _, SignatureEncoding as _},
};
use sha2::Sha256;

use crate::{
    error::CryptoError,
    identity::{IdentityKeyPair, IdentityPublicKey, IdentitySecret},
};

/// Sign `data` with the identity private key.
///
/// ECDSA signatures are deterministic (RFC 6979); RSA-PSS draws its salt from
/// `rng`.
///
/// # Errors
///
/// - `Signing` if the underlying signer fails
pub fn sign(
    identity: &IdentityKeyPair,
    data: &[u8],
    rng: &mut impl CryptoRngCore,
) -> Result<Vec<u8>, CryptoError> {
    match &identity.secret {
        IdentitySecret::Ec(secret) => {
            let signing_key = ecdsa::SigningKey::from(secret);
            let signature: ecdsa::Signature = signing_key
                .try_sign(data)
                .map_err(|e| CryptoError::Signing { reason: e.to_string() })?;
            Ok(signature.to_bytes().to_vec())
        },
        IdentitySecret::Rsa(secret) => {
            // PSS salt length defaults to the digest size (32 bytes for SHA-256)
            let signing_key = pss::SigningKey::<Sha256>::new((**secret).clone());
            let signature = signing_key
                .try_sign_with_rng(rng, data)
                .map_err(|e| CryptoError::Signing { reason: e.to_string() })?;
            Ok(signature.to_vec())
        },
    }
}

/// Verify `signature` over `data` with an identity public key.
///
/// Returns `false` for any malformed signature, never an error.
pub fn verify(public: &IdentityPublicKey, data: &[u8], signature: &[u8]) -> bool {
    match public {
        IdentityPublicKey::Ec(key) => {
            let Ok(signature) = ecdsa::Signature::from_slice(signature) else {
                return false;
            };
            ecdsa::VerifyingKey::from(key).verify(data, &signature).is_ok()
        },
        IdentityPublicKey::Rsa(key) => {
            let Ok(signature) = pss::Signature::try_from(signature) else {
                return false;
            };
            pss::VerifyingKey::<Sha256>::new(key.clone()).verify(data, &signature).is_ok()
        },
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::{ecdh::EphemeralKeyPair, identity::IdentityAlgorithm};

    fn ec_identity() -> IdentityKeyPair {
        IdentityKeyPair::generate(IdentityAlgorithm::EcdsaP256, &mut OsRng).unwrap()
    }

    #[test]
    fn ec_sign_verify_roundtrip() {
        let identity = ec_identity();
        let ephemeral = EphemeralKeyPair::generate(&mut OsRng).public_key_bytes();

        let signature = sign(&identity, &ephemeral, &mut OsRng).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(identity.public_key(), &ephemeral, &signature));
    }

    #[test]
    fn flipped_data_bit_fails_verification() {
        let identity = ec_identity();
        let mut data = EphemeralKeyPair::generate(&mut OsRng).public_key_bytes();
        let signature = sign(&identity, &data, &mut OsRng).unwrap();

        data[10] ^= 0x01;
        assert!(!verify(identity.public_key(), &data, &signature));
    }

    #[test]
    fn flipped_signature_bit_fails_verification() {
        let identity = ec_identity();
        let data = b"ephemeral key bytes";
        let mut signature = sign(&identity, data, &mut OsRng).unwrap();

        signature[5] ^= 0x80;
        assert!(!verify(identity.public_key(), data, &signature));
    }

    #[test]
    fn other_identity_does_not_verify() {
        let signer = ec_identity();
        let other = ec_identity();
        let signature = sign(&signer, b"data", &mut OsRng).unwrap();

        assert!(!verify(other.public_key(), b"data", &signature));
    }

    #[test]
    fn malformed_signature_returns_false() {
        let identity = ec_identity();
        assert!(!verify(identity.public_key(), b"data", &[]));
        assert!(!verify(identity.public_key(), b"data", &[0u8; 3]));
        assert!(!verify(identity.public_key(), b"data", &[0u8; 64]));
    }

    #[test]
    fn rsa_sign_verify_and_mismatched_algorithm() {
        let rsa = IdentityKeyPair::generate(IdentityAlgorithm::RsaPss, &mut OsRng).unwrap();
        let ec = ec_identity();
        let data = b"raw ephemeral public key";

        let rsa_signature = sign(&rsa, data, &mut OsRng).unwrap();
        assert_eq!(rsa_signature.len(), 256);
        assert!(verify(rsa.public_key(), data, &rsa_signature));

        let mut tampered = rsa_signature.clone();
        tampered[100] ^= 0x01;
        assert!(!verify(rsa.public_key(), data, &tampered));

        // Signature from one algorithm presented to the other
        let ec_signature = sign(&ec, data, &mut OsRng).unwrap();
        assert!(!verify(rsa.public_key(), data, &ec_signature));
        assert!(!verify(ec.public_key(), data, &rsa_signature));
    }
}
