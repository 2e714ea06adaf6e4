//! Cipherchat wire types.
//!
//! JSON bodies exchanged with the remote handshake endpoints and the chat
//! publish/subscribe transport. Raw bytes (keys, IVs, ciphertexts,
//! signatures) travel as standard base64 strings; field names are camelCase.
//!
//! Handshake responses model every field as optional. The handshake state
//! machine, not the decoder, decides whether a missing field is fatal, so a
//! malformed server response surfaces as a typed handshake failure naming the
//! field.
//!
//! Chat payloads are a tagged union ([`ChatBody`]) dispatched on the `type`
//! field and matched exhaustively by the message channel.

#![forbid(unsafe_code)]

pub mod b64;
pub mod chat;
mod error;
pub mod handshake;

pub use chat::{ChatBody, ChatEnvelope};
pub use error::{ProtocolError, Result};
pub use handshake::{
    ConfirmRequest, ConfirmResponse, InitiateRequest, InitiateResponse, VulnerableInitiateRequest,
    VulnerableInitiateResponse,
};
use serde::{Serialize, de::DeserializeOwned};

/// Encode a wire value as JSON bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decode a wire value from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
