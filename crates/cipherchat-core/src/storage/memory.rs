use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use super::{KeyValueStore, StorageError};

/// In-memory store for tests and the in-process demo
///
/// All state lives behind `Arc<Mutex<>>`, so clones share records. A
/// poisoned lock is recovered: every operation is a single map call and
/// leaves the map consistent.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    fn put(&self, id: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(id.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(id);
        Ok(())
    }
}
