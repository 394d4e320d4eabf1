//! Durable snapshot storage for in-memory queues.
//!
//! A queue is persisted as one JSON array under a stable key. Every `save`
//! replaces the whole record, so a reader never sees a half-written queue.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::KeyValueStore;
use crate::error::LedgerError;

/// Stable keys for the queues kept by this crate.
pub mod keys {
    /// Live mutation queue.
    pub const MUTATION_QUEUE: &str = "offline_actions";
    /// Mutations that exhausted their retries or need a manual decision.
    pub const DEAD_LETTERS: &str = "offline_actions_dead_letter";
    /// Offline payments.
    pub const PAYMENTS: &str = "offline_payments";
    /// Resolved and pending conflicts.
    pub const CONFLICTS: &str = "sync_conflicts";
}

/// Typed snapshot store over a [`KeyValueStore`].
pub struct PersistentQueueStore<T> {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PersistentQueueStore<T> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PersistentQueueStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a store for `key` on top of `kv`.
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
            _marker: PhantomData,
        }
    }

    /// Overwrite the durable record with `items`.
    ///
    /// # Errors
    ///
    /// Returns `StorageDegraded` if serialization or the write fails.
    pub async fn save(&self, items: &[T]) -> Result<(), LedgerError> {
        let bytes = serde_json::to_vec(items).map_err(|e| {
            LedgerError::StorageDegraded(format!("could not serialize {}: {e}", self.key))
        })?;

        self.kv
            .set(&self.key, bytes)
            .await
            .map_err(|e| LedgerError::StorageDegraded(format!("could not write {}: {e}", self.key)))
    }

    /// Load the last saved snapshot, or an empty queue if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored record is corrupt.
    pub async fn load(&self) -> Result<Vec<T>, LedgerError> {
        match self.kv.get(&self.key).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Remove the durable record entirely.
    ///
    /// # Errors
    ///
    /// Returns `StorageDegraded` if the delete fails.
    pub async fn clear(&self) -> Result<(), LedgerError> {
        self.kv
            .remove(&self.key)
            .await
            .map_err(|e| LedgerError::StorageDegraded(format!("could not clear {}: {e}", self.key)))
    }
}
