//! SQLite-backed store.
//!
//! One writer connection behind a mutex applies each batch as a single
//! transaction; point reads go through the read-only [`ReaderPool`].

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::reader::ReaderPool;
use super::schema::{apply_pragmas, initialize_schema, UPSERT_SQL};
use super::{Store, StoreError, WriteRequest};
use crate::now_millis;

/// Default number of pooled read connections.
pub const DEFAULT_READER_POOL_SIZE: u32 = 4;

/// Key/value store persisted in a SQLite file.
pub struct SqliteStore {
    path: PathBuf,
    writer: Mutex<Connection>,
    readers: ReaderPool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// The schema is created before the reader pool is opened, so pooled
    /// read-only connections always find the table.
    pub fn open<P: AsRef<Path>>(path: P, reader_pool_size: u32) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let conn = Connection::open(&path)?;
        apply_pragmas(&conn)?;
        initialize_schema(&conn)?;

        let readers = ReaderPool::new(&path, reader_pool_size)?;

        tracing::info!(path = %path.display(), reader_pool_size, "Opened SQLite store");

        Ok(Self {
            path,
            writer: Mutex::new(conn),
            readers,
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows currently committed.
    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.readers.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Store for SqliteStore {
    fn batch_write(&self, batch: &[WriteRequest]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            let updated_at = now_millis();
            for req in batch {
                stmt.execute(params![req.key(), req.value(), updated_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.readers.read_value(key)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("readers", &self.readers.state())
            .finish_non_exhaustive()
    }
}
