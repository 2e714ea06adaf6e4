//! Handshake error types
//!
//! A single terminal error per failed handshake attempt. Every variant aborts
//! the attempt, discards its transient key material and returns the state
//! machine to `Idle`; retry is an explicit caller action.

use std::time::Duration;

use cipherchat_crypto::CryptoError;
use cipherchat_proto::ProtocolError;
use thiserror::Error;

use crate::{handshake::HandshakeState, identity::KeyStoreError};

/// Reason a handshake attempt was aborted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: HandshakeState,
        /// Operation that was attempted
        operation: String,
    },

    /// Another attempt for the same identity is still running
    #[error("handshake already in progress for {user_id}")]
    AlreadyInProgress {
        /// Identity with the running attempt
        user_id: String,
    },

    /// Confirmation requested for a session without a handshake id
    #[error("session is unauthenticated and cannot be confirmed")]
    NotConfirmable,

    /// Responder omitted a required response field
    #[error("malformed response: missing {field}")]
    MissingField {
        /// Wire name of the missing field
        field: &'static str,
    },

    /// Responder's ephemeral key is not signed by the pinned responder identity
    #[error("responder signature invalid")]
    ResponderSignatureInvalid,

    /// Key agreement, derivation or AEAD failure
    #[error("cryptographic failure: {0}")]
    Crypto(#[from] CryptoError),

    /// Identity key could not be loaded or generated
    #[error("identity unavailable: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// Wire body could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Responder refused the request
    #[error("rejected by responder ({status}): {reason}")]
    Rejected {
        /// Responder audit status
        status: String,
        /// Responder message
        reason: String,
    },

    /// Responder unreachable
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote call did not resolve in time
    #[error("remote call timed out after {elapsed:?}")]
    Timeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Attempt abandoned by a reset
    #[error("handshake cancelled")]
    Cancelled,

    /// Vulnerable mode requested without the `insecure-demo` feature
    #[error("vulnerable handshake mode is disabled in this build")]
    InsecureModeDisabled,
}

impl HandshakeError {
    /// Returns true if a fresh attempt may succeed without any change.
    ///
    /// Timeouts and transport failures are transient. Rejections and
    /// cryptographic failures indicate a broken or malicious peer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }
}
