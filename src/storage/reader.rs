//! Read connection pool for the SQLite store.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access.
//! SQLite WAL mode lets readers run alongside the single writer, and a
//! reader only ever sees fully committed batches.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;

use super::schema::{apply_reader_pragmas, select_value};
use super::StoreError;

/// Read connection pool for point lookups.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReaderPool {
    /// Create a new reader pool for the given database path.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file
    /// * `max_size` - Maximum number of connections in the pool
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub fn new<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size)
            .connection_customizer(Box::new(ReaderConnectionCustomizer))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    /// Get the current pool state for monitoring.
    pub fn state(&self) -> r2d2::State {
        self.pool.state()
    }

    /// Read the committed value for `key`.
    pub fn read_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.get()?;
        Ok(select_value(&conn, key)?)
    }
}

/// Connection customizer that applies reader pragmas.
#[derive(Debug)]
struct ReaderConnectionCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReaderConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{apply_pragmas, initialize_schema, UPSERT_SQL};
    use rusqlite::{params, Connection};
    use tempfile::TempDir;

    #[test]
    fn test_reader_pool_reads_committed_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create the database first with write connection
        {
            let conn = Connection::open(&db_path).unwrap();
            apply_pragmas(&conn).unwrap();
            initialize_schema(&conn).unwrap();
            conn.execute(UPSERT_SQL, params!["k", "v", 1_i64]).unwrap();
        }

        let pool = ReaderPool::new(&db_path, 5).unwrap();

        assert_eq!(pool.read_value("k").unwrap().as_deref(), Some("v"));
        assert_eq!(pool.read_value("nope").unwrap(), None);
    }
}
