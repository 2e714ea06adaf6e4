//! Long-term identity keys.
//!
//! An identity key is either ECDSA P-256 (default) or RSA-PSS 2048, both over
//! SHA-256. The private half is only ever used to sign and to be persisted by
//! the identity key store; the public half is exported in a JWK-equivalent
//! form for the remote side.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::{SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand_core::CryptoRngCore;
use rsa::{
    BigUint, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
    traits::PublicKeyParts,
};
use serde::{Deserialize, Serialize};

use crate::{ecdh::import_public_key, error::CryptoError};

/// RSA modulus size for RSA-PSS identities.
pub const RSA_MODULUS_BITS: usize = 2048;

/// Signature algorithm of an identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IdentityAlgorithm {
    /// ECDSA over P-256 with SHA-256
    #[default]
    #[serde(rename = "EC")]
    EcdsaP256,
    /// RSA-PSS 2048 with SHA-256 and a 32-byte salt
    #[serde(rename = "RSA")]
    RsaPss,
}

impl std::fmt::Display for IdentityAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EcdsaP256 => f.write_str("ECDSA-P256"),
            Self::RsaPss => f.write_str("RSA-PSS-2048"),
        }
    }
}

/// Private identity key material.
pub(crate) enum IdentitySecret {
    Ec(SecretKey),
    Rsa(Box<RsaPrivateKey>),
}

/// Long-term signing keypair.
pub struct IdentityKeyPair {
    pub(crate) secret: IdentitySecret,
    public: IdentityPublicKey,
}

impl IdentityKeyPair {
    /// Generate a new keypair for `algorithm`.
    ///
    /// # Errors
    ///
    /// - `KeyGeneration` if RSA prime generation fails
    pub fn generate(
        algorithm: IdentityAlgorithm,
        rng: &mut impl CryptoRngCore,
    ) -> Result<Self, CryptoError> {
        let secret = match algorithm {
            IdentityAlgorithm::EcdsaP256 => IdentitySecret::Ec(SecretKey::random(rng)),
            IdentityAlgorithm::RsaPss => {
                let key = RsaPrivateKey::new(rng, RSA_MODULUS_BITS)
                    .map_err(|e| CryptoError::KeyGeneration { reason: e.to_string() })?;
                IdentitySecret::Rsa(Box::new(key))
            },
        };
        Ok(Self::from_secret(secret))
    }

    /// Rebuild a keypair from bytes produced by
    /// [`private_key_bytes`](Self::private_key_bytes).
    ///
    /// EC keys are the 32-byte scalar; RSA keys are PKCS#8 DER.
    pub fn from_private_key_bytes(
        algorithm: IdentityAlgorithm,
        bytes: &[u8],
    ) -> Result<Self, CryptoError> {
        let secret = match algorithm {
            IdentityAlgorithm::EcdsaP256 => {
                let key = SecretKey::from_slice(bytes).map_err(|_| {
                    CryptoError::InvalidPrivateKey { reason: "not a P-256 scalar".to_string() }
                })?;
                IdentitySecret::Ec(key)
            },
            IdentityAlgorithm::RsaPss => {
                let key = RsaPrivateKey::from_pkcs8_der(bytes)
                    .map_err(|e| CryptoError::InvalidPrivateKey { reason: e.to_string() })?;
                IdentitySecret::Rsa(Box::new(key))
            },
        };
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: IdentitySecret) -> Self {
        let public = match &secret {
            IdentitySecret::Ec(key) => IdentityPublicKey::Ec(key.public_key()),
            IdentitySecret::Rsa(key) => IdentityPublicKey::Rsa(key.to_public_key()),
        };
        Self { secret, public }
    }

    /// Serialize the private key for persistence.
    ///
    /// Only the identity key store should call this.
    pub fn private_key_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        match &self.secret {
            IdentitySecret::Ec(key) => Ok(key.to_bytes().to_vec()),
            IdentitySecret::Rsa(key) => key
                .to_pkcs8_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| CryptoError::Encoding { reason: e.to_string() }),
        }
    }

    /// Algorithm of this keypair.
    pub fn algorithm(&self) -> IdentityAlgorithm {
        self.public.algorithm()
    }

    /// Public half.
    pub fn public_key(&self) -> &IdentityPublicKey {
        &self.public
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

/// Public identity key used to verify handshake signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityPublicKey {
    /// ECDSA P-256 public key
    Ec(p256::PublicKey),
    /// RSA-PSS public key
    Rsa(RsaPublicKey),
}

impl IdentityPublicKey {
    /// Algorithm this key verifies.
    pub fn algorithm(&self) -> IdentityAlgorithm {
        match self {
            Self::Ec(_) => IdentityAlgorithm::EcdsaP256,
            Self::Rsa(_) => IdentityAlgorithm::RsaPss,
        }
    }

    /// Export in JWK-equivalent form.
    pub fn to_jwk(&self) -> PublicJwk {
        match self {
            Self::Ec(key) => {
                let point = key.to_encoded_point(false);
                // Uncompressed points always carry both coordinates
                let x = point.x().map(|x| URL_SAFE_NO_PAD.encode(x)).unwrap_or_default();
                let y = point.y().map(|y| URL_SAFE_NO_PAD.encode(y)).unwrap_or_default();
                PublicJwk::Ec { crv: "P-256".to_string(), x, y }
            },
            Self::Rsa(key) => PublicJwk::Rsa {
                n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
                e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
            },
        }
    }

    /// Import from JWK-equivalent form.
    ///
    /// # Errors
    ///
    /// - `UnsupportedJwk` if the curve is not P-256 or a field is not base64url
    /// - `InvalidPublicKey` if the coordinates / modulus do not form a key
    pub fn from_jwk(jwk: &PublicJwk) -> Result<Self, CryptoError> {
        match jwk {
            PublicJwk::Ec { crv, x, y } => {
                if crv != "P-256" {
                    return Err(CryptoError::UnsupportedJwk {
                        reason: format!("unsupported curve {crv}"),
                    });
                }
                let x = decode_field("x", x)?;
                let y = decode_field("y", y)?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(CryptoError::InvalidPublicKey {
                        reason: "P-256 coordinates must be 32 bytes".to_string(),
                    });
                }

                let mut sec1 = Vec::with_capacity(65);
                sec1.push(0x04);
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);
                import_public_key(&sec1).map(Self::Ec)
            },
            PublicJwk::Rsa { n, e } => {
                let n = BigUint::from_bytes_be(&decode_field("n", n)?);
                let e = BigUint::from_bytes_be(&decode_field("e", e)?);
                RsaPublicKey::new(n, e)
                    .map(Self::Rsa)
                    .map_err(|err| CryptoError::InvalidPublicKey { reason: err.to_string() })
            },
        }
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| CryptoError::UnsupportedJwk { reason: format!("field {name} is not base64url") })
}

/// JWK-equivalent public key.
///
/// Serializes as `{"kty":"EC","crv":"P-256","x":..,"y":..}` or
/// `{"kty":"RSA","n":..,"e":..}` with base64url (unpadded) fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum PublicJwk {
    /// Elliptic-curve key
    #[serde(rename = "EC")]
    Ec {
        /// Curve name, always `P-256`
        crv: String,
        /// X coordinate
        x: String,
        /// Y coordinate
        y: String,
    },
    /// RSA key
    #[serde(rename = "RSA")]
    Rsa {
        /// Modulus
        n: String,
        /// Public exponent
        e: String,
    },
}
