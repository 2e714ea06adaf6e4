//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness). Key
//! generation, IVs, nonces and timestamps all flow from one [`Environment`],
//! so tests can pin them while production uses the OS.

use std::time::Duration;

use rand_core::{CryptoRng, RngCore};

/// Abstract environment providing time, randomness, and async sleep.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Wall-clock time in Unix epoch milliseconds.
    ///
    /// Used for wire timestamps and freshness checks.
    fn wall_clock_millis(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// Only drivers use this (request timeouts); protocol logic never sleeps.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random uuid-v4 string, used for handshake and message nonces.
    fn random_uuid(&self) -> String {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
    }
}

/// Adapts an [`Environment`] into a `rand_core` RNG for key generation.
pub struct EnvRng<'a, E: Environment> {
    env: &'a E,
}

impl<'a, E: Environment> EnvRng<'a, E> {
    /// Borrow the environment as an RNG.
    pub fn new(env: &'a E) -> Self {
        Self { env }
    }
}

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.env.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.env.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.env.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.env.random_bytes(dest);
        Ok(())
    }
}

// Sound only because `Environment::random_bytes` is required to be a CSPRNG
impl<E: Environment> CryptoRng for EnvRng<'_, E> {}

#[cfg(test)]
pub(crate) mod test_env {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use rand_core::{OsRng, RngCore};

    use super::Environment;

    /// OS randomness with a manually driven wall clock.
    #[derive(Clone, Default)]
    pub(crate) struct TestEnv {
        clock_ms: Arc<AtomicU64>,
    }

    impl TestEnv {
        pub(crate) fn at(millis: u64) -> Self {
            Self { clock_ms: Arc::new(AtomicU64::new(millis)) }
        }

        pub(crate) fn advance_millis(&self, millis: u64) {
            self.clock_ms.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Environment for TestEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn wall_clock_millis(&self) -> u64 {
            self.clock_ms.load(Ordering::SeqCst)
        }

        fn sleep(
            &self,
            _duration: std::time::Duration,
        ) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            OsRng.fill_bytes(buffer);
        }
    }
}
