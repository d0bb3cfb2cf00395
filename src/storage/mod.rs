//! Storage layer for Spillway.
//!
//! Provides:
//! - The [`Store`] contract the batcher flushes into
//! - An in-memory store guarded by a single lock
//! - A SQLite store with one transaction per batch
//! - Read connection pool and schema for the SQLite store

pub mod memory;
pub mod reader;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single key/value write waiting to be batched.
///
/// Fields are private so a request cannot change after it has been handed
/// to the batcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteRequest {
    key: String,
    value: String,
}

impl WriteRequest {
    /// Create a new write request.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Split the request into its key and value.
    pub fn into_parts(self) -> (String, String) {
        (self.key, self.value)
    }
}

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("store task failed: {0}")]
    TaskFailed(String),
}

/// A mutating key/value store that accepts atomic batches.
///
/// Implementations must apply a batch atomically with respect to concurrent
/// reads and other batch writes: a reader never sees half a batch. Within a
/// batch, a later entry for the same key wins.
pub trait Store: Send + Sync + 'static {
    /// Apply every request in order as one atomic write.
    ///
    /// An empty batch is a successful no-op.
    fn batch_write(&self, batch: &[WriteRequest]) -> Result<(), StoreError>;

    /// Look up the current value of `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}
