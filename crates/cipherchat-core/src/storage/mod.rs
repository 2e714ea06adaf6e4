//! Key/value storage abstraction for identity keys
//!
//! Records are opaque byte blobs addressed by string id. The trait is
//! synchronous (no async); callers that cannot block hand the work to a
//! blocking pool.

mod error;
mod faulty;
mod memory;

pub use error::StorageError;
pub use faulty::{FaultMode, FaultyStore};
pub use memory::MemoryStore;

/// Persistent key/value store for identity records
///
/// Must be Clone (shared between the key store and drivers), Send + Sync
/// (thread-safe), and synchronous. Implementations share internal state via
/// Arc, so clones access the same underlying storage.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Load the record stored under `id`. `None` if absent.
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `id`, replacing any previous record.
    ///
    /// # Invariants
    ///
    /// - Post: a subsequent `get(id)` returns exactly `value`
    /// - Post: on error, the previous record (if any) is unchanged
    fn put(&self, id: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove the record stored under `id`. Removing an absent id is not an
    /// error.
    fn delete(&self, id: &str) -> Result<(), StorageError>;
}
