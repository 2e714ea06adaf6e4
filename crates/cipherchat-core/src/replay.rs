//! Replay guard
//!
//! Admits a `(nonce, timestamp)` pair at most once within a freshness window.
//! Used by the responder for handshake requests and by the message channel
//! for inbound chat envelopes.
//!
//! # Invariants
//!
//! - A nonce is accepted at most once while it is retained.
//! - A nonce is retained for at least `nonce_ttl`, and no window checked by
//!   the guard exceeds `nonce_ttl`, so a duplicate is rejected for as long as
//!   its timestamp could still be fresh.
//! - Memory stays bounded: expired nonces are swept as time advances.
//!
//! Timestamps ahead of the local clock are not rejected; their nonce is
//! retained relative to the later of the two clocks.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use thiserror::Error;
use tracing::debug;

/// Default freshness window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(20);

/// Replay guard configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGuardConfig {
    /// Maximum accepted age of a timestamp
    pub window: Duration,
    /// How long a seen nonce is remembered. Clamped to at least `window`.
    pub nonce_ttl: Duration,
}

impl Default for ReplayGuardConfig {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW, nonce_ttl: DEFAULT_WINDOW }
    }
}

/// Outcome of [`ReplayGuard::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Fresh and never seen
    Accepted,
    /// Timestamp older than the window
    Stale,
    /// Nonce already seen
    Duplicate,
}

impl Admission {
    /// Whether the message may be processed.
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }

    /// Convert a rejection into an error naming the nonce.
    ///
    /// # Errors
    ///
    /// `ReplayRejectedError` for `Stale` and `Duplicate`.
    pub fn into_result(self, nonce: &str) -> Result<(), ReplayRejectedError> {
        match self {
            Self::Accepted => Ok(()),
            Self::Stale => Err(ReplayRejectedError::Stale { nonce: nonce.to_owned() }),
            Self::Duplicate => Err(ReplayRejectedError::Duplicate { nonce: nonce.to_owned() }),
        }
    }
}

/// A message rejected by the replay guard
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayRejectedError {
    /// Timestamp outside the freshness window
    #[error("timestamp expired for nonce {nonce}")]
    Stale {
        /// Offending nonce
        nonce: String,
    },

    /// Nonce already used
    #[error("duplicate nonce {nonce}")]
    Duplicate {
        /// Offending nonce
        nonce: String,
    },
}

/// Nonce-and-timestamp replay filter.
///
/// Safe to share between tasks; all state is behind one mutex.
#[derive(Debug)]
pub struct ReplayGuard {
    config: ReplayGuardConfig,
    inner: Mutex<GuardState>,
}

#[derive(Debug, Default)]
struct GuardState {
    /// nonce -> retention base (ms)
    seen: HashMap<String, u64>,
    last_sweep_ms: u64,
}

impl ReplayGuard {
    /// Create a guard. `nonce_ttl` is raised to `window` if shorter.
    pub fn new(config: ReplayGuardConfig) -> Self {
        let config = ReplayGuardConfig {
            window: config.window,
            nonce_ttl: config.nonce_ttl.max(config.window),
        };
        Self { config, inner: Mutex::new(GuardState::default()) }
    }

    /// Effective configuration.
    pub fn config(&self) -> ReplayGuardConfig {
        self.config
    }

    /// Whether `timestamp_ms` is outside the configured window. Records
    /// nothing.
    pub fn is_stale(&self, timestamp_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(timestamp_ms) > duration_millis(self.config.window)
    }

    /// Check a message against the configured window and record its nonce.
    pub fn admit(&self, nonce: &str, timestamp_ms: u64, now_ms: u64) -> Admission {
        self.admit_within(nonce, timestamp_ms, now_ms, self.config.window)
    }

    /// Check a message against an explicit `window` and record its nonce.
    ///
    /// `window` is clamped to `nonce_ttl`: a nonce is only remembered that
    /// long, so a wider window would admit replays of swept nonces. Stale
    /// messages are rejected before the nonce is consulted and their nonce
    /// is not recorded.
    pub fn admit_within(
        &self,
        nonce: &str,
        timestamp_ms: u64,
        now_ms: u64,
        window: Duration,
    ) -> Admission {
        let window_ms = duration_millis(window.min(self.config.nonce_ttl));
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut state, now_ms);

        if now_ms.saturating_sub(timestamp_ms) > window_ms {
            debug!(nonce, timestamp_ms, now_ms, "rejected stale nonce");
            return Admission::Stale;
        }

        if state.seen.contains_key(nonce) {
            debug!(nonce, "rejected duplicate nonce");
            return Admission::Duplicate;
        }

        state.seen.insert(nonce.to_owned(), timestamp_ms.max(now_ms));
        Admission::Accepted
    }

    /// Number of retained nonces.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).seen.len()
    }

    /// Whether no nonces are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop nonces whose retention has lapsed. Runs at most once per
    /// retention period.
    fn sweep(&self, state: &mut GuardState, now_ms: u64) {
        let retention_ms = duration_millis(self.config.nonce_ttl);
        if now_ms.saturating_sub(state.last_sweep_ms) < retention_ms {
            return;
        }

        let before = state.seen.len();
        state.seen.retain(|_, base| now_ms.saturating_sub(*base) <= retention_ms);
        state.last_sweep_ms = now_ms;

        let evicted = before - state.seen.len();
        if evicted > 0 {
            debug!(evicted, retained = state.seen.len(), "swept expired nonces");
        }
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(ReplayGuardConfig::default())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
