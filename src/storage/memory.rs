//! In-memory store behind a single exclusive lock.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Store, StoreError, WriteRequest};

/// Key/value map protected by one mutex.
///
/// Every read and every batch write takes the same lock, so a batch is
/// applied atomically with respect to readers and other writers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct keys held.
    pub fn len(&self) -> Result<usize, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(data.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Store for MemoryStore {
    fn batch_write(&self, batch: &[WriteRequest]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut data = self.data.lock().map_err(|_| StoreError::LockPoisoned)?;
        for req in batch {
            data.insert(req.key().to_owned(), req.value().to_owned());
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(data.get(key).cloned())
    }
}
