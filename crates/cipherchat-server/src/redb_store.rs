//! Redb-backed durable key store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety: a
//! `put` either commits the whole record or leaves the previous one.

use std::{path::Path, sync::Arc};

use cipherchat_core::{KeyValueStore, StorageError};
use redb::{Database, ReadableTableMetadata, TableDefinition};

/// Table: records
/// Key: record id (e.g. `user:<userId>:identity`)
/// Value: opaque record bytes (CBOR identity records)
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(RECORDS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the table cannot be read.
    pub fn len(&self) -> Result<u64, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(RECORDS).map_err(|e| StorageError::Io(e.to_string()))?;
        table.len().map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl KeyValueStore for RedbStore {
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(RECORDS).map_err(|e| StorageError::Io(e.to_string()))?;

        let value = table.get(id).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn put(&self, id: &str, value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(RECORDS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(id, value).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(RECORDS).map_err(|e| StorageError::Io(e.to_string()))?;
            table.remove(id).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn put_get_delete() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("keys.redb")).unwrap();

        assert_eq!(store.get("user:a:identity").unwrap(), None);
        store.put("user:a:identity", b"record").unwrap();
        assert_eq!(store.get("user:a:identity").unwrap().as_deref(), Some(&b"record"[..]));
        assert_eq!(store.len().unwrap(), 1);

        store.delete("user:a:identity").unwrap();
        store.delete("user:a:identity").unwrap();
        assert_eq!(store.get("user:a:identity").unwrap(), None);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.put("user:a:identity", b"persisted").unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get("user:a:identity").unwrap().as_deref(), Some(&b"persisted"[..]));
    }
}
