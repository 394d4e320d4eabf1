//! Key-value durable storage providers.
//!
//! The queues only need `get(key) -> bytes?` and `set(key, bytes)`; anything
//! that can do that atomically per key can back them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::LedgerError;

/// Durable key-value provider.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the blob stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Replace the blob stored under `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

    /// Delete the blob stored under `key`, if any.
    async fn remove(&self, key: &str) -> Result<(), LedgerError>;
}

/// `SQLite`-backed store using the `kv_store` table.
#[derive(Clone)]
pub struct SqliteKvStore {
    db: Database,
}

impl SqliteKvStore {
    /// Wrap an open database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, LedgerError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.with_connection(f))
            .await
            .map_err(|e| LedgerError::Database(format!("Storage task failed: {e}")))?
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                [&key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .map_err(|e| LedgerError::Database(format!("Failed to read {key}: {e}")))
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.execute(
                r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                  ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                 updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .map_err(|e| LedgerError::Database(format!("Failed to write {key}: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), LedgerError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", [&key])
                .map_err(|e| LedgerError::Database(format!("Failed to delete {key}: {e}")))?;
            Ok(())
        })
        .await
    }
}

/// Process-local store. Survives nothing, but keeps the same contract.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, LedgerError> {
        self.entries
            .lock()
            .map_err(|_| LedgerError::Database("Memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        self.entries()?.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LedgerError> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Memory store whose writes can be switched to fail.
    #[derive(Default)]
    pub struct FlakyStore {
        inner: MemoryKvStore,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(LedgerError::Database("disk I/O error".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), LedgerError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(LedgerError::Database("disk I/O error".to_string()));
            }
            self.inner.remove(key).await
        }
    }
}
