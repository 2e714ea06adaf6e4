//! Authenticated encryption using AES-256-GCM.
//!
//! All functions are pure - the IV must be provided by the caller. Callers
//! MUST draw a fresh random IV for every encryption under a given key.
//!
//! The `_with_aad` variants authenticate associated data alongside the
//! ciphertext: metadata sent in the clear that must not be altered.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{error::CryptoError, keys::AeadKey};

/// AES-GCM IV size (96 bits).
pub const IV_SIZE: usize = 12;

/// GCM authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `key` with the given IV.
///
/// Returns ciphertext with the 16-byte tag appended.
pub fn encrypt(key: &AeadKey, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Vec<u8> {
    encrypt_with_aad(key, iv, plaintext, &[])
}

/// Encrypt `plaintext` under `key`, authenticating `aad` without encrypting
/// it.
pub fn encrypt_with_aad(
    key: &AeadKey,
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Vec<u8> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let payload = Payload { msg: plaintext, aad };
    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(iv), payload) else {
        unreachable!("AES-256-GCM encryption cannot fail for in-memory inputs");
    };

    ciphertext
}

/// Decrypt and authenticate `ciphertext` under `key`.
///
/// # Errors
///
/// - `InvalidIv`: if `iv` is not 12 bytes
/// - `DecryptionFailed`: if the tag does not verify (wrong key, tampering, or
///   truncation)
pub fn decrypt(key: &AeadKey, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    decrypt_with_aad(key, iv, ciphertext, &[])
}

/// Decrypt `ciphertext` and authenticate it together with `aad`.
///
/// # Errors
///
/// As [`decrypt`]; a different `aad` than at encryption fails
/// authentication.
pub fn decrypt_with_aad(
    key: &AeadKey,
    iv: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let iv: &[u8; IV_SIZE] = iv
        .try_into()
        .map_err(|_| CryptoError::InvalidIv { expected: IV_SIZE, actual: iv.len() })?;

    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("ciphertext shorter than tag ({} bytes)", ciphertext.len()),
        });
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })
}
