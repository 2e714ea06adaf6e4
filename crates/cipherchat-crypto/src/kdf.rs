//! Session key derivation using HKDF-SHA256.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{ecdh::SharedSecret, keys::{KEY_SIZE, SessionKey}};

/// Protocol-wide HKDF salt. The responder uses the same constant.
pub const SESSION_KEY_SALT: &[u8] = b"cipherchat-handshake-salt-v1";

/// Protocol-wide HKDF info label.
pub const SESSION_KEY_INFO: &[u8] = b"cipherchat session key v1";

/// Stretch an ECDH secret into an AES-256-GCM session key.
///
/// Extract-and-expand with a fixed salt and label, so identical secrets always
/// yield identical keys on both ends of the handshake.
pub fn derive_session_key(secret: &SharedSecret) -> SessionKey {
    SessionKey::from_bytes(expand(secret.as_bytes()))
}

fn expand(ikm: &[u8]) -> [u8; KEY_SIZE] {
    let hkdf = Hkdf::<Sha256>::new(Some(SESSION_KEY_SALT), ikm);

    let mut okm = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(SESSION_KEY_INFO, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    okm
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;
    use crate::ecdh::EphemeralKeyPair;

    #[test]
    fn derive_is_deterministic() {
        let ikm = [7u8; 32];
        assert_eq!(expand(&ikm), expand(&ikm), "same inputs must produce same output");
    }

    #[test]
    fn different_secrets_produce_different_keys() {
        assert_ne!(expand(&[0u8; 32]), expand(&[1u8; 32]));
    }

    #[test]
    fn output_differs_from_input() {
        let ikm = [0x42u8; 32];
        assert_ne!(expand(&ikm), ikm);
    }

    #[test]
    fn both_sides_derive_same_session_key() {
        let client = EphemeralKeyPair::generate(&mut OsRng);
        let server = EphemeralKeyPair::generate(&mut OsRng);
        let client_public = client.public_key_bytes();
        let server_public = server.public_key_bytes();

        let client_key = derive_session_key(&client.agree(&server_public).unwrap());
        let server_key = derive_session_key(&server.agree(&client_public).unwrap());

        assert_eq!(client_key, server_key);
    }
}
