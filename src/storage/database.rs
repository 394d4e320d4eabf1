//! `SQLite` database connection and operations.
//!
//! The database is stored at `~/.offline-ledger/ledger.db` and contains the
//! `kv_store` table that backs every durable queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::LedgerError;

use super::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared database connection wrapper.
///
/// Cloning is cheap; all clones share one connection guarded by a mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(|e| {
            LedgerError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;
        // Several CLI processes may share one file
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| LedgerError::Database(format!("Failed to set busy timeout: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")
            .map_err(|e| LedgerError::Database(format!("Failed to configure journal: {e}")))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LedgerError::Database(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, LedgerError> {
        migrations::run(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Schema version recorded in `PRAGMA user_version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, LedgerError> {
        self.with_connection(migrations::get_version)
    }

    /// Run `f` with the connection lock held.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned or `f` fails.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::Database("Database connection lock poisoned".to_string()))?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_is_migrated() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), migrations::CURRENT_VERSION);
    }

    #[test]
    fn test_file_uses_wal() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("ledger.db");

        let db = Database::open_at(&db_path).unwrap();
        let mode: String = db
            .with_connection(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| LedgerError::Database(e.to_string()))
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert!(db_path.exists());
    }

    #[test]
    fn test_rows_survive_reopen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("ledger.db");

        Database::open_at(&db_path)
            .unwrap()
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO kv_store (key, value, updated_at) VALUES ('k', x'00', 'now')",
                    [],
                )
                .map_err(|e| LedgerError::Database(e.to_string()))
            })
            .unwrap();

        let count: i64 = Database::open_at(&db_path)
            .unwrap()
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))
                    .map_err(|e| LedgerError::Database(e.to_string()))
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
