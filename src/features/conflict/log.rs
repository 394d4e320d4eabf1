//! Durable record of every conflict and its decision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::model::{Resolution, SyncConflict};
use crate::error::LedgerError;
use crate::storage::{keys, KeyValueStore, PersistentQueueStore};

/// Append-mostly log of conflicts, persisted under [`keys::CONFLICTS`].
///
/// One instance is shared by both queue managers so the partition has a
/// single writer.
pub struct ConflictLog {
    store: PersistentQueueStore<SyncConflict>,
    entries: Mutex<Vec<SyncConflict>>,
    degraded: AtomicBool,
}

impl ConflictLog {
    /// Load the log from durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored log cannot be read or parsed.
    pub async fn open(kv: Arc<dyn KeyValueStore>) -> Result<Self, LedgerError> {
        let store = PersistentQueueStore::new(kv, keys::CONFLICTS);
        let entries = store.load().await?;
        Ok(Self {
            store,
            entries: Mutex::new(entries),
            degraded: AtomicBool::new(false),
        })
    }

    /// Append a resolved conflict.
    pub async fn record(&self, conflict: SyncConflict) {
        let mut entries = self.entries.lock().await;
        entries.push(conflict);
        self.persist(&entries).await;
    }

    /// All conflicts, oldest first.
    pub async fn list(&self) -> Vec<SyncConflict> {
        self.entries.lock().await.clone()
    }

    /// Conflicts parked for a user decision.
    pub async fn pending_manual(&self) -> Vec<SyncConflict> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|c| c.awaiting_user())
            .cloned()
            .collect()
    }

    /// Look up one conflict.
    pub async fn get(&self, id: Uuid) -> Option<SyncConflict> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Record the user's decision for a parked conflict.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, `InvalidPayload` when the
    /// decision is `Manual` again, and `ConflictDetected` when the conflict
    /// was already settled.
    pub async fn resolve_manually(
        &self,
        id: Uuid,
        decision: Resolution,
    ) -> Result<SyncConflict, LedgerError> {
        if decision == Resolution::Manual {
            return Err(LedgerError::InvalidPayload(
                "a manual decision must keep local, keep remote, or merge".to_string(),
            ));
        }

        let mut entries = self.entries.lock().await;
        let conflict = entries
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| LedgerError::NotFound(format!("conflict {id}")))?;

        if !conflict.awaiting_user() {
            return Err(LedgerError::ConflictDetected(format!(
                "conflict {id} was already resolved as {}",
                conflict.resolution.label()
            )));
        }

        conflict.resolution = decision;
        conflict.resolved_at = Utc::now();
        let updated = conflict.clone();
        self.persist(&entries).await;
        Ok(updated)
    }

    /// Drop settled conflicts resolved more than `older_than` ago.
    ///
    /// Conflicts still awaiting a decision are always kept.
    pub async fn purge_resolved(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|c| c.awaiting_user() || c.resolved_at >= cutoff);
        let purged = before - entries.len();

        if purged > 0 {
            self.persist(&entries).await;
            tracing::info!(purged, "settled conflicts purged");
        }
        purged
    }

    /// Whether the last durable write failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    async fn persist(&self, entries: &[SyncConflict]) {
        match self.store.save(entries).await {
            Ok(()) => self.degraded.store(false, Ordering::SeqCst),
            Err(e) => {
                tracing::warn!(error = %e, "conflict log not persisted");
                self.degraded.store(true, Ordering::SeqCst);
            }
        }
    }
}
