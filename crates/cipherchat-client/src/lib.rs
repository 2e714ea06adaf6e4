//! Client
//!
//! Async drivers around the sans-IO pieces of [`cipherchat_core`].
//!
//! # Components
//!
//! - [`HandshakeCoordinator`]: single-flight handshake driver with timeouts,
//!   cancellation and [`HandshakeEvent`]s
//! - [`ChatSession`]: sends and receives chat messages under the group key
//! - [`HandshakeTransport`] / [`MessageTransport`]: injected transport seams
//!
//! # Features
//!
//! - `insecure-demo`: allows [`HandshakeMode::Vulnerable`]. Without it the
//!   coordinator refuses that mode with `InsecureModeDisabled`.

#![forbid(unsafe_code)]

mod coordinator;
mod error;
mod event;
mod session;
pub mod transport;

pub use cipherchat_core::{
    EstablishedSession, HandshakeError, HandshakeMode, HandshakeState, SessionSecurity,
};
pub use coordinator::{DEFAULT_REQUEST_TIMEOUT, HandshakeConfig, HandshakeCoordinator};
pub use error::{ChatError, TransportError};
pub use event::HandshakeEvent;
pub use session::ChatSession;
pub use transport::{HandshakeTransport, MessageTransport};
