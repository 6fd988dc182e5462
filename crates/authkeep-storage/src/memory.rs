//! In-process storage backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{validate_key, DurableStorage, StorageError};

/// A [`DurableStorage`] that keeps every slot in memory.
///
/// Cloning the handle shares the underlying map, so a test can hand one
/// clone to the session store and keep another to inspect or tamper with
/// the slots directly.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Synchronous read, for tests and diagnostics.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    // A poisoned lock only means another thread panicked mid-insert; the
    // map itself is still a valid map.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl DurableStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.lock().insert(key.to_string(), value.to_vec());
        tracing::trace!(key, bytes = value.len(), "memory slot written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.lock().remove(key);
        Ok(())
    }
}
