//! Server
//!
//! Reference implementation of the remote handshake endpoints, plus the
//! production environment and durable storage.
//!
//! # Components
//!
//! - [`Responder`]: `initiate`, `confirm` and (with `insecure-demo`)
//!   `vulnerable-initiate`
//! - [`SecurityLog`]: bounded audit trail of every responder decision
//! - [`SystemEnv`]: OS time and randomness
//! - [`RedbStore`]: durable [`cipherchat_core::KeyValueStore`]

#![forbid(unsafe_code)]

pub mod audit;
mod redb_store;
mod responder;
mod system_env;

pub use audit::{AuditStatus, SecurityEvent, SecurityLog};
pub use redb_store::RedbStore;
pub use responder::{Responder, ResponderConfig, ResponderError};
pub use system_env::SystemEnv;
