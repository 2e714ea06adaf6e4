//! Client error types

use cipherchat_core::HandshakeError;
use cipherchat_proto::ProtocolError;
use thiserror::Error;

/// Errors from a handshake or message transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Remote end unreachable or connection dropped
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Body could not be encoded or decoded
    #[error("malformed body: {0}")]
    Malformed(String),

    /// Remote end refused the request
    #[error("remote rejected request ({status}): {reason}")]
    Remote {
        /// Remote status label
        status: String,
        /// Remote message
        reason: String,
    },
}

impl From<ProtocolError> for TransportError {
    fn from(error: ProtocolError) -> Self {
        Self::Malformed(error.to_string())
    }
}

impl From<TransportError> for HandshakeError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Unavailable(reason) => Self::Transport(reason),
            TransportError::Malformed(reason) => Self::Protocol(ProtocolError::Decode(reason)),
            TransportError::Remote { status, reason } => Self::Rejected { status, reason },
        }
    }
}

/// Errors from a chat session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Session came from an unauthenticated handshake
    #[error("session has no group key")]
    NoGroupKey,

    /// Publish or subscribe failed
    #[error(transparent)]
    Transport(#[from] TransportError),
}
