//! Observable handshake progress

use cipherchat_core::{HandshakeError, HandshakeState, SessionSecurity};

/// Emitted by the coordinator as an attempt progresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// State machine moved
    Transition {
        /// Identity running the attempt
        user_id: String,
        /// Previous state
        from: HandshakeState,
        /// New state
        to: HandshakeState,
    },

    /// Attempt completed
    Established {
        /// Identity running the attempt
        user_id: String,
        /// Authentication level of the session
        security: SessionSecurity,
    },

    /// Attempt aborted; the state machine is back in `Idle`
    Failed {
        /// Identity running the attempt
        user_id: String,
        /// Reason
        error: HandshakeError,
    },
}

impl HandshakeEvent {
    /// Identity the event belongs to.
    pub fn user_id(&self) -> &str {
        match self {
            Self::Transition { user_id, .. }
            | Self::Established { user_id, .. }
            | Self::Failed { user_id, .. } => user_id,
        }
    }
}
