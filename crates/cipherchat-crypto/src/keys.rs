//! Symmetric key holders.
//!
//! Both [`SessionKey`] and [`GroupKey`] are AES-256-GCM keys. They are kept as
//! distinct types so a session key can never be handed to the message channel
//! by mistake.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Size of every symmetric key in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Raw 256-bit AEAD key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Wrap a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(key))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Algorithm tag carried alongside the key material.
    pub fn algorithm(&self) -> &'static str {
        "AES-256-GCM"
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadKey").field("algorithm", &self.algorithm()).finish_non_exhaustive()
    }
}

impl PartialEq for AeadKey {
    fn eq(&self, other: &Self) -> bool {
        // Fold the whole array so the comparison does not short-circuit
        self.0.iter().zip(other.0.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }
}

impl Eq for AeadKey {}

/// Symmetric key bound to exactly one handshake.
///
/// Used only to send the key confirmation and unwrap the group key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionKey(AeadKey);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(AeadKey::from_bytes(bytes))
    }

    /// The underlying AEAD key.
    pub fn key(&self) -> &AeadKey {
        &self.0
    }
}

/// Symmetric key shared by every participant of a chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupKey(AeadKey);

impl GroupKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(AeadKey::from_bytes(bytes))
    }

    /// Wrap a slice (e.g. an unwrapped key), checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        AeadKey::from_slice(bytes).map(Self)
    }

    /// The underlying AEAD key.
    pub fn key(&self) -> &AeadKey {
        &self.0
    }
}
