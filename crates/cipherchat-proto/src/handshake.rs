//! Handshake endpoint bodies.
//!
//! ```text
//! client                                   responder
//!   │ InitiateRequest (eph, identity, sig)      │
//!   │──────────────────────────────────────────>│
//!   │ InitiateResponse (handshakeId, eph)       │
//!   │<──────────────────────────────────────────│
//!   │ ConfirmRequest (id, iv, tag)              │
//!   │──────────────────────────────────────────>│
//!   │ ConfirmResponse (encryptedGroupKey, iv)   │
//!   │<──────────────────────────────────────────│
//! ```

use cipherchat_crypto::PublicJwk;
use serde::{Deserialize, Serialize};

use crate::b64;

/// Body of `POST initiate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    /// Raw (uncompressed SEC1) client ephemeral public key
    #[serde(with = "b64")]
    pub client_ephemeral_key: Vec<u8>,
    /// Client identity public key in JWK form
    pub client_identity_key: PublicJwk,
    /// Identity signature over `client_ephemeral_key`
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
    /// Random uuid-v4 nonce
    pub nonce: String,
    /// Epoch milliseconds at send time
    pub timestamp: u64,
}

/// Response to `POST initiate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    /// Responder-assigned handshake id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_id: Option<String>,
    /// Raw responder ephemeral public key
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub server_ephemeral_key: Option<Vec<u8>>,
    /// Responder identity signature over `server_ephemeral_key`
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub server_signature: Option<Vec<u8>>,
}

/// Body of `POST vulnerable-initiate`. No signature, no identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerableInitiateRequest {
    /// Raw client ephemeral public key
    #[serde(with = "b64")]
    pub client_ephemeral_key: Vec<u8>,
}

/// Response to `POST vulnerable-initiate`. Carries no handshake id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerableInitiateResponse {
    /// Raw responder ephemeral public key
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub server_ephemeral_key: Option<Vec<u8>>,
}

/// Body of `POST confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Id from the initiate response
    pub handshake_id: String,
    /// IV used to encrypt the confirmation payload
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    /// Confirmation literal encrypted under the session key
    #[serde(with = "b64")]
    pub confirmation_tag: Vec<u8>,
    /// Random uuid-v4 nonce
    pub nonce: String,
    /// Epoch milliseconds at send time
    pub timestamp: u64,
}

/// Response to `POST confirm`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    /// Group key encrypted under the session key
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub encrypted_group_key: Option<Vec<u8>>,
    /// IV for `encrypted_group_key`
    #[serde(default, with = "b64::option", skip_serializing_if = "Option::is_none")]
    pub group_iv: Option<Vec<u8>>,
}
