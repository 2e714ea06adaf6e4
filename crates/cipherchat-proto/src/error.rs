//! Protocol encoding errors.

use thiserror::Error;

/// Result alias for wire encoding.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from encoding or decoding wire bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Value could not be serialized
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes are not a valid body (bad JSON, bad base64, unknown `type`)
    #[error("decode failed: {0}")]
    Decode(String),
}
