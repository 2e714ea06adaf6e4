//! Core
//!
//! Protocol logic for establishing a chat session and carrying messages over
//! it. Nothing in this crate performs I/O: remote calls are made by the
//! client driver, time and randomness come from an [`Environment`], and
//! persistence goes through a [`KeyValueStore`].
//!
//! # Components
//!
//! - [`IdentityKeyStore`]: load-or-create long-term signing keys per user
//! - [`Handshake`]: sans-IO handshake state machine producing an
//!   [`EstablishedSession`]
//! - [`ReplayGuard`]: nonce and freshness filter shared by both sides
//! - [`MessageChannel`]: per-message encryption under the group key
//!
//! # Features
//!
//! - `insecure-demo`: enables the unauthenticated handshake variant used to
//!   demonstrate man-in-the-middle attacks. Off by default.

#![forbid(unsafe_code)]

pub mod channel;
pub mod env;
mod error;
pub mod handshake;
pub mod identity;
pub mod replay;
pub mod storage;

pub use channel::{
    Decrypted, DecryptionFailedError, FileAttachment, MessageChannel, Opened, Sealed,
    UNDECRYPTABLE_PLACEHOLDER,
};
pub use env::{EnvRng, Environment};
pub use error::HandshakeError;
pub use handshake::{
    CONFIRMATION_PAYLOAD, EstablishedSession, Handshake, HandshakeMode, HandshakeState,
    SessionSecurity, Transition,
};
pub use identity::{IdentityKeyStore, IdentityKeys, KeyStoreError, identity_key_id};
pub use replay::{Admission, ReplayGuard, ReplayGuardConfig, ReplayRejectedError};
pub use storage::{KeyValueStore, MemoryStore, StorageError};
