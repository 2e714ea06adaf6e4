//! Ephemeral P-256 key agreement.
//!
//! Ephemeral keys use the same curve as identity keys so both travel in the
//! same SEC1 encoding. Public keys are exported in uncompressed "raw" form
//! (`0x04 || x || y`, 65 bytes).

use p256::{PublicKey, SecretKey, ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint};
use rand_core::CryptoRngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length of an uncompressed SEC1 P-256 public key.
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Raw 32-byte ECDH output. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Raw secret bytes (input to HKDF).
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// One-time key-agreement keypair.
///
/// Not `Clone` and not serializable. [`agree`](Self::agree) consumes the
/// keypair so it cannot take part in a second agreement.
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh keypair.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        let secret = SecretKey::random(rng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Public half in uncompressed SEC1 form.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Run ECDH against the peer's raw public key, consuming this keypair.
    pub fn agree(self, remote_public: &[u8]) -> Result<SharedSecret, CryptoError> {
        derive_shared_secret(&self.secret, remote_public)
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair").finish_non_exhaustive()
    }
}

/// Elliptic-curve Diffie-Hellman between a local secret and a raw remote
/// public key.
///
/// Symmetric: `derive(a, B) == derive(b, A)`.
///
/// # Errors
///
/// - `InvalidPublicKey` if `remote_public` is not a valid P-256 point
pub fn derive_shared_secret(
    local: &SecretKey,
    remote_public: &[u8],
) -> Result<SharedSecret, CryptoError> {
    let remote = import_public_key(remote_public)?;
    let shared = diffie_hellman(local.to_nonzero_scalar(), remote.as_affine());

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(shared.raw_secret_bytes());
    Ok(SharedSecret(bytes))
}

/// Parse a SEC1-encoded P-256 public key.
pub(crate) fn import_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey {
        reason: format!("{} bytes are not a P-256 point", bytes.len()),
    })
}
