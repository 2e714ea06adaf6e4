//! Simulation harness for cipherchat.
//!
//! In-process implementations of the client transports, a seeded
//! [`Environment`](cipherchat_core::Environment), and an active attacker for
//! demonstrating why the handshake signs its ephemeral keys.
//!
//! # Attack simulation
//!
//! [`MitmTransport`] swaps ephemeral keys in flight. Against the
//! unauthenticated variant it ends up sharing one session key with each side;
//! against the authenticated variant the swap is detected and the handshake
//! aborts. This crate always enables `insecure-demo` on its dependencies and
//! must never be linked into a deployment.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod hub;
pub mod loopback;
pub mod mitm;
pub mod scenario;
pub mod sim_env;

pub use hub::PubSubHub;
pub use loopback::LoopbackTransport;
pub use mitm::{Intercepted, Interception, MitmTransport};
pub use scenario::World;
pub use sim_env::{SIM_EPOCH_MS, SimEnv};
