//! Identity key store
//!
//! Guarantees each user id has exactly one persisted long-term signing
//! keypair. Keys are generated on first use and loaded afterwards; records
//! are CBOR-encoded under `user:<userId>:identity`.
//!
//! # Invariants
//!
//! - Concurrent [`IdentityKeyStore::ensure_keys`] calls for the same user id
//!   converge on the same persisted keypair.
//! - A failed write never leaves a partial record: the keypair is returned
//!   only after the store acknowledged the write.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use cipherchat_crypto::{CryptoError, IdentityAlgorithm, IdentityKeyPair, IdentityPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    env::{EnvRng, Environment},
    storage::{KeyValueStore, StorageError},
};

/// Storage id of a user's identity record.
pub fn identity_key_id(user_id: &str) -> String {
    format!("user:{user_id}:identity")
}

/// Errors from the identity key store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// Backing store failed
    #[error("identity storage failed: {0}")]
    Storage(#[from] StorageError),

    /// Key generation or import failed
    #[error("identity key material rejected: {0}")]
    Crypto(#[from] CryptoError),

    /// Stored record exists but cannot be decoded
    #[error("corrupt identity record {id}: {reason}")]
    Corrupt {
        /// Storage id of the record
        id: String,
        /// Decoder message
        reason: String,
    },

    /// Blocking key generation task did not complete
    #[error("identity task aborted: {0}")]
    Aborted(String),
}

/// Persisted form of an identity keypair.
#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    id: String,
    algorithm: IdentityAlgorithm,
    created_at_ms: u64,
    #[serde(with = "serde_bytes")]
    private_key: Vec<u8>,
}

/// A user's long-term identity.
pub struct IdentityKeys {
    id: String,
    created_at_ms: u64,
    keypair: IdentityKeyPair,
}

impl IdentityKeys {
    /// Storage id (`user:<userId>:identity`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time in Unix epoch milliseconds.
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Signature algorithm of the keypair.
    pub fn algorithm(&self) -> IdentityAlgorithm {
        self.keypair.algorithm()
    }

    /// Signing keypair.
    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    /// Public half, as sent in the initiate request.
    pub fn public_key(&self) -> &IdentityPublicKey {
        self.keypair.public_key()
    }
}

impl std::fmt::Debug for IdentityKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeys")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm())
            .field("created_at_ms", &self.created_at_ms)
            .finish_non_exhaustive()
    }
}

/// Load-or-create store for identity keypairs.
pub struct IdentityKeyStore<S: KeyValueStore, E: Environment> {
    store: S,
    env: E,
    algorithm: IdentityAlgorithm,
    /// Per-user locks serializing load-or-create
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: KeyValueStore, E: Environment> IdentityKeyStore<S, E> {
    /// Create a store generating `algorithm` keys for new users.
    pub fn new(store: S, env: E, algorithm: IdentityAlgorithm) -> Self {
        Self { store, env, algorithm, locks: Mutex::new(HashMap::new()) }
    }

    /// Algorithm used for newly generated identities.
    pub fn algorithm(&self) -> IdentityAlgorithm {
        self.algorithm
    }

    /// Return the user's identity, generating and persisting one if absent.
    ///
    /// An existing record is returned unchanged, whatever its algorithm.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::Storage` if the store cannot be read or written
    /// - `KeyStoreError::Corrupt` if the stored record cannot be decoded
    /// - `KeyStoreError::Crypto` if key generation fails
    pub fn ensure_keys(&self, user_id: &str) -> Result<Arc<IdentityKeys>, KeyStoreError> {
        self.with_user_lock(user_id, || self.load_or_generate(user_id))
    }

    fn load_or_generate(&self, user_id: &str) -> Result<Arc<IdentityKeys>, KeyStoreError> {
        if let Some(keys) = self.load(user_id)? {
            debug!(user_id, "loaded identity keys");
            return Ok(keys);
        }

        let id = identity_key_id(user_id);
        let keypair = IdentityKeyPair::generate(self.algorithm, &mut EnvRng::new(&self.env))?;
        let created_at_ms = self.env.wall_clock_millis();

        let record = StoredIdentity {
            id: id.clone(),
            algorithm: keypair.algorithm(),
            created_at_ms,
            private_key: keypair.private_key_bytes()?,
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&record, &mut bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.put(&id, &bytes)?;

        info!(user_id, algorithm = %keypair.algorithm(), "generated identity keys");
        Ok(Arc::new(IdentityKeys { id, created_at_ms, keypair }))
    }

    /// Load the user's identity without generating one.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::Storage` if the store cannot be read
    /// - `KeyStoreError::Corrupt` if the stored record cannot be decoded
    pub fn load(&self, user_id: &str) -> Result<Option<Arc<IdentityKeys>>, KeyStoreError> {
        let id = identity_key_id(user_id);
        let Some(bytes) = self.store.get(&id)? else {
            return Ok(None);
        };

        let record: StoredIdentity = ciborium::from_reader(bytes.as_slice())
            .map_err(|e| KeyStoreError::Corrupt { id: id.clone(), reason: e.to_string() })?;
        if record.id != id {
            return Err(KeyStoreError::Corrupt {
                id,
                reason: format!("record belongs to {}", record.id),
            });
        }

        let keypair = IdentityKeyPair::from_private_key_bytes(record.algorithm, &record.private_key)
            .map_err(|e| KeyStoreError::Corrupt { id: id.clone(), reason: e.to_string() })?;

        Ok(Some(Arc::new(IdentityKeys { id, created_at_ms: record.created_at_ms, keypair })))
    }

    /// Delete the user's identity. The next `ensure_keys` generates a new one.
    ///
    /// # Errors
    ///
    /// - `KeyStoreError::Storage` if the store cannot be written
    pub fn forget(&self, user_id: &str) -> Result<(), KeyStoreError> {
        self.with_user_lock(user_id, || -> Result<(), KeyStoreError> {
            self.store.delete(&identity_key_id(user_id))?;
            info!(user_id, "forgot identity keys");
            Ok(())
        })
    }

    /// Run `f` holding the user's lock, then drop the lock entry if no
    /// other caller is holding or waiting on it.
    fn with_user_lock<T>(&self, user_id: &str, f: impl FnOnce() -> T) -> T {
        let user_lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(user_id.to_owned()).or_default())
        };

        let result = {
            let _guard = user_lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Clones are only taken under the map lock, so a count of two (map
        // plus ours) cannot grow while we hold it.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(user_id).is_some_and(|held| Arc::ptr_eq(held, &user_lock))
            && Arc::strong_count(&user_lock) == 2
        {
            locks.remove(user_id);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use cipherchat_crypto::{sign, verify};
    use rand_core::OsRng;

    use super::*;
    use crate::{
        env::test_env::TestEnv,
        storage::{FaultMode, FaultyStore, MemoryStore},
    };

    fn store() -> IdentityKeyStore<MemoryStore, TestEnv> {
        IdentityKeyStore::new(MemoryStore::new(), TestEnv::at(1_700_000_000_000), IdentityAlgorithm::EcdsaP256)
    }

    #[test]
    fn generates_once_then_loads() {
        let keys = store();

        let first = keys.ensure_keys("alice").unwrap();
        let second = keys.ensure_keys("alice").unwrap();

        assert_eq!(first.id(), "user:alice:identity");
        assert_eq!(first.created_at_ms(), 1_700_000_000_000);
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn distinct_users_get_distinct_keys() {
        let keys = store();

        let alice = keys.ensure_keys("alice").unwrap();
        let bob = keys.ensure_keys("bob").unwrap();

        assert_ne!(alice.public_key(), bob.public_key());
    }

    #[test]
    fn loaded_keys_still_sign() {
        let keys = store();
        let original = keys.ensure_keys("alice").unwrap();

        let reloaded = keys.load("alice").unwrap().unwrap();
        let signature = sign(reloaded.keypair(), b"payload", &mut OsRng).unwrap();

        assert!(verify(original.public_key(), b"payload", &signature));
    }

    #[test]
    fn concurrent_callers_converge() {
        let keys = Arc::new(store());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = Arc::clone(&keys);
                thread::spawn(move || keys.ensure_keys("alice").unwrap().public_key().clone())
            })
            .collect();

        let publics: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(publics.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn idle_user_locks_are_released() {
        let keys = Arc::new(store());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let keys = Arc::clone(&keys);
                thread::spawn(move || {
                    let user = format!("user-{}", i % 3);
                    keys.ensure_keys(&user).unwrap();
                    keys.forget(&user).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(keys.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn forget_rotates_identity() {
        let keys = store();
        let before = keys.ensure_keys("alice").unwrap();

        keys.forget("alice").unwrap();
        assert!(keys.load("alice").unwrap().is_none());

        let after = keys.ensure_keys("alice").unwrap();
        assert_ne!(before.public_key(), after.public_key());
    }

    #[test]
    fn write_failure_persists_nothing() {
        let faulty = FaultyStore::new(MemoryStore::new());
        let keys =
            IdentityKeyStore::new(faulty.clone(), TestEnv::default(), IdentityAlgorithm::EcdsaP256);

        faulty.set_mode(FaultMode::FailWrites);
        let err = keys.ensure_keys("alice").unwrap_err();
        assert!(matches!(err, KeyStoreError::Storage(StorageError::Unavailable(_))));
        assert!(faulty.inner().is_empty());

        faulty.set_mode(FaultMode::Healthy);
        keys.ensure_keys("alice").unwrap();
        assert_eq!(faulty.write_count(), 1);
    }

    #[test]
    fn read_failure_is_surfaced() {
        let faulty = FaultyStore::new(MemoryStore::new());
        let keys =
            IdentityKeyStore::new(faulty.clone(), TestEnv::default(), IdentityAlgorithm::EcdsaP256);

        faulty.set_mode(FaultMode::FailReads);
        assert!(matches!(keys.ensure_keys("alice"), Err(KeyStoreError::Storage(_))));
        assert_eq!(faulty.write_count(), 0);
    }

    #[test]
    fn corrupt_record_is_rejected() {
        let memory = MemoryStore::new();
        memory.put("user:alice:identity", b"not cbor").unwrap();
        let keys = IdentityKeyStore::new(memory, TestEnv::default(), IdentityAlgorithm::EcdsaP256);

        assert!(matches!(keys.ensure_keys("alice"), Err(KeyStoreError::Corrupt { .. })));
    }
}
