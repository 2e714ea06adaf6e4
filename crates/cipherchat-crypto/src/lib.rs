//! Cipherchat Cryptographic Primitives
//!
//! Cryptographic building blocks for the cipherchat handshake and message
//! channel. Pure functions with deterministic outputs wherever the algorithm
//! allows it. Callers provide randomness (an RNG for key generation, raw bytes
//! for IVs) so higher layers can drive everything from a single environment.
//!
//! # Key Lifecycle
//!
//! ```text
//! Identity Key (ECDSA P-256 / RSA-PSS, long-term)
//!        │ signs
//!        ▼
//! Ephemeral Key (ECDH P-256, one handshake)
//!        │ ECDH with peer ephemeral
//!        ▼
//! Shared Secret (32 bytes)
//!        │ HKDF-SHA256 (fixed salt + label)
//!        ▼
//! Session Key (AES-256-GCM)
//!        │ unwraps
//!        ▼
//! Group Key (AES-256-GCM) → chat messages
//! ```
//!
//! # Security
//!
//! - Ephemeral keys are consumed by [`EphemeralKeyPair::agree`]; a keypair
//!   cannot be used for a second agreement and is zeroized on drop.
//! - Session and group keys are zeroized on drop and never implement
//!   `Debug` with their contents.
//! - AEAD decryption failures are always reported as errors; a wrong key or
//!   tampered ciphertext never yields plaintext.
//! - Signature verification returns `false` for any malformed input instead
//!   of erroring.

#![forbid(unsafe_code)]

pub mod aead;
pub mod ecdh;
mod error;
pub mod identity;
pub mod kdf;
mod keys;
pub mod signature;

pub use aead::{IV_SIZE, TAG_SIZE, decrypt, decrypt_with_aad, encrypt, encrypt_with_aad};
pub use ecdh::{EphemeralKeyPair, PUBLIC_KEY_SIZE, SharedSecret, derive_shared_secret};
pub use error::CryptoError;
pub use identity::{IdentityAlgorithm, IdentityKeyPair, IdentityPublicKey, PublicJwk};
pub use kdf::{SESSION_KEY_INFO, SESSION_KEY_SALT, derive_session_key};
pub use keys::{AeadKey, GroupKey, KEY_SIZE, SessionKey};
pub use signature::{sign, verify};
