//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by the cryptographic primitives.
///
/// Variants carry a short reason string rather than the underlying library
/// error so that no key material can leak through `Display`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Public key bytes are not a valid point / modulus for the algorithm.
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Private key bytes could not be decoded.
    #[error("invalid private key: {reason}")]
    InvalidPrivateKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Key generation failed (RNG or parameter failure).
    #[error("key generation failed: {reason}")]
    KeyGeneration {
        /// Underlying failure
        reason: String,
    },

    /// Signing failed.
    #[error("signing failed: {reason}")]
    Signing {
        /// Underlying failure
        reason: String,
    },

    /// Private key could not be serialized.
    #[error("encoding failed: {reason}")]
    Encoding {
        /// Underlying failure
        reason: String,
    },

    /// IV has the wrong length.
    #[error("invalid IV length: expected {expected}, got {actual}")]
    InvalidIv {
        /// Required length
        expected: usize,
        /// Length that was provided
        actual: usize,
    },

    /// Authenticated decryption failed (wrong key, tampering, truncation).
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Why decryption failed
        reason: String,
    },

    /// Key material has the wrong length for a symmetric key.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Length that was provided
        actual: usize,
    },

    /// JWK is missing fields or names an unsupported key type.
    #[error("unsupported JWK: {reason}")]
    UnsupportedJwk {
        /// What was wrong with the JWK
        reason: String,
    },
}
