//! Connectivity-driven sync loop.
//!
//! `SyncService` wires the mutation queue and the payment queue to one
//! connectivity source. On every offline to online transition it drains
//! both queues concurrently; while online it also ticks on a fixed interval
//! whenever work is pending. There is no ordering between the two queues.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::LedgerError;
use crate::features::conflict::{ConflictLog, ConflictResolver, EntityKind, Resolution};
use crate::features::payments::{
    HttpPaymentGateway, OfflinePayment, PaymentAnalytics, PaymentQueueManager, PaymentStatus,
    SyncReport,
};
use crate::features::sync::{DrainReport, HttpDispatcher, MutationQueueManager, QueueItem, QueueStatus};
use crate::network::ConnectivityProvider;
use crate::remote::RemoteClient;
use crate::storage::KeyValueStore;

/// Outcome of one combined sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPass {
    pub mutations: DrainReport,
    pub payments: SyncReport,
}

/// What a manual conflict decision did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", content = "record", rename_all = "snake_case")]
pub enum ConflictOutcome {
    /// Requeued mutation, or `None` if the item was dropped.
    Mutation(Option<QueueItem>),
    /// Updated payment, or `None` if no payment was waiting on the conflict.
    Payment(Option<OfflinePayment>),
}

/// Combined status for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatus {
    pub queue: QueueStatus,
    pub payments: PaymentAnalytics,
    pub pending_conflicts: usize,
}

/// Owns both queues and keeps them in step with connectivity.
pub struct SyncService {
    connectivity: Arc<dyn ConnectivityProvider>,
    queue: Arc<MutationQueueManager>,
    payments: Arc<PaymentQueueManager>,
    conflicts: Arc<ConflictLog>,
    interval: Duration,
}

impl SyncService {
    #[must_use]
    pub fn new(
        connectivity: Arc<dyn ConnectivityProvider>,
        queue: Arc<MutationQueueManager>,
        payments: Arc<PaymentQueueManager>,
        conflicts: Arc<ConflictLog>,
        interval: Duration,
    ) -> Self {
        Self {
            connectivity,
            queue,
            payments,
            conflicts,
            interval,
        }
    }

    /// Build the HTTP-backed managers described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or stored
    /// queues cannot be loaded.
    pub async fn open(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivityProvider>,
    ) -> Result<Self, LedgerError> {
        let client = RemoteClient::new(&config.remote)?;
        let resolver = ConflictResolver::new(config.conflicts.policy);
        let conflicts = Arc::new(ConflictLog::open(Arc::clone(&kv)).await?);

        let queue = MutationQueueManager::open(
            Arc::clone(&kv),
            Arc::clone(&connectivity),
            Arc::new(HttpDispatcher::new(client.clone())),
            Arc::clone(&conflicts),
            resolver,
            &config.queue,
        )
        .await?;
        let payments = PaymentQueueManager::open(
            kv,
            Arc::clone(&connectivity),
            Arc::new(HttpPaymentGateway::new(client)),
            Arc::clone(&conflicts),
            resolver,
            &config.payments,
        )
        .await?;

        Ok(Self::new(
            connectivity,
            Arc::new(queue),
            Arc::new(payments),
            conflicts,
            config.queue.sync_interval(),
        ))
    }

    #[must_use]
    pub fn queue(&self) -> &MutationQueueManager {
        &self.queue
    }

    #[must_use]
    pub fn payments(&self) -> &PaymentQueueManager {
        &self.payments
    }

    #[must_use]
    pub fn conflicts(&self) -> &ConflictLog {
        &self.conflicts
    }

    /// Drain the mutation queue and sync payments concurrently.
    pub async fn sync_now(&self) -> SyncPass {
        let (mutations, payments) = tokio::join!(self.queue.drain(), self.payments.sync_all());
        SyncPass {
            mutations,
            payments,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut online = self.connectivity.subscribe();
        let mut was_online = *online.borrow_and_update();

        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!(online = was_online, interval = ?self.interval, "sync service started");
        if was_online {
            self.sync_now().await;
        }

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_online = *online.borrow_and_update();
                    if now_online && !was_online {
                        tracing::info!("back online, syncing queues");
                        self.sync_now().await;
                    }
                    was_online = now_online;
                }
                _ = ticker.tick() => {
                    if self.connectivity.is_online() && self.has_pending_work().await {
                        tracing::debug!("periodic sync");
                        self.sync_now().await;
                    }
                }
            }
        }
        tracing::info!("sync service stopped");
    }

    /// Apply a manual conflict decision to whichever queue holds the record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown conflict and the manager's error
    /// if the decision cannot be applied.
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        decision: Resolution,
    ) -> Result<ConflictOutcome, LedgerError> {
        let conflict = self
            .conflicts
            .get(conflict_id)
            .await
            .ok_or_else(|| LedgerError::NotFound(format!("conflict {conflict_id}")))?;

        match conflict.subject.entity {
            EntityKind::Payment => self
                .payments
                .resolve_conflict(conflict_id, decision)
                .await
                .map(ConflictOutcome::Payment),
            EntityKind::Transaction | EntityKind::Invoice => self
                .queue
                .resolve_conflict(conflict_id, decision)
                .await
                .map(ConflictOutcome::Mutation),
        }
    }

    /// Snapshot of both queues and the conflict log.
    pub async fn status(&self) -> LedgerStatus {
        LedgerStatus {
            queue: self.queue.get_status().await,
            payments: self.payments.analytics().await,
            pending_conflicts: self.conflicts.pending_manual().await.len(),
        }
    }

    async fn has_pending_work(&self) -> bool {
        if self.queue.get_status().await.queue_length > 0 {
            return true;
        }
        self.payments
            .list(None)
            .await
            .iter()
            .any(|p| !p.status.is_terminal() && p.status != PaymentStatus::Failed)
    }
}
