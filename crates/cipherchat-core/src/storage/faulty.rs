//! Fault-injecting store wrapper
//!
//! Wraps another [`KeyValueStore`] and fails selected operations on demand.
//! Used to check that storage outages surface as errors and never leave a
//! half-written identity behind.

use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicUsize, Ordering},
};

use super::{KeyValueStore, StorageError};

/// Which operations a [`FaultyStore`] fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultMode {
    /// Delegate everything
    Healthy = 0,
    /// Fail reads
    FailReads = 1,
    /// Fail writes and deletes
    FailWrites = 2,
    /// Fail every operation
    Unavailable = 3,
}

impl FaultMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::FailReads,
            2 => Self::FailWrites,
            3 => Self::Unavailable,
            _ => Self::Healthy,
        }
    }

    fn fails_reads(self) -> bool {
        matches!(self, Self::FailReads | Self::Unavailable)
    }

    fn fails_writes(self) -> bool {
        matches!(self, Self::FailWrites | Self::Unavailable)
    }
}

/// Store wrapper with switchable failures
///
/// Clones share both the inner store and the fault switch.
#[derive(Clone)]
pub struct FaultyStore<S: KeyValueStore> {
    inner: S,
    mode: Arc<AtomicU8>,
    writes: Arc<AtomicUsize>,
}

impl<S: KeyValueStore> FaultyStore<S> {
    /// Wrap `inner`, initially healthy.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            mode: Arc::new(AtomicU8::new(FaultMode::Healthy as u8)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Switch the failure mode for subsequent operations.
    pub fn set_mode(&self, mode: FaultMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    /// Current failure mode.
    pub fn mode(&self) -> FaultMode {
        FaultMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    /// Underlying store (for checking state after faults).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of successful writes delegated to the inner store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl<S: KeyValueStore> KeyValueStore for FaultyStore<S> {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if self.mode().fails_reads() {
            return Err(StorageError::Unavailable(format!("injected read fault for {id}")));
        }
        self.inner.get(id)
    }

    fn put(&self, id: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.mode().fails_writes() {
            return Err(StorageError::Unavailable(format!("injected write fault for {id}")));
        }
        self.inner.put(id, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        if self.mode().fails_writes() {
            return Err(StorageError::Unavailable(format!("injected delete fault for {id}")));
        }
        self.inner.delete(id)
    }
}
