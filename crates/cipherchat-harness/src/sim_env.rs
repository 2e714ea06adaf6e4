//! Deterministic environment
//!
//! Seeded ChaCha20 randomness and a manually advanced wall clock. Two
//! `SimEnv`s with the same seed produce the same keys, IVs and nonces.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use cipherchat_core::Environment;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};

/// Wall clock at which simulations start (2023-11-14T22:13:20Z)
pub const SIM_EPOCH_MS: u64 = 1_700_000_000_000;

/// Seeded simulation environment. Clones share the clock and the RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    clock_ms: Arc<AtomicU64>,
}

impl SimEnv {
    /// Environment seeded with `seed`, clock at [`SIM_EPOCH_MS`].
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            clock_ms: Arc::new(AtomicU64::new(SIM_EPOCH_MS)),
        }
    }

    /// Move the wall clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.clock_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn wall_clock_millis(&self) -> u64 {
        self.clock_ms.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
