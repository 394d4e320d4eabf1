//! Mutation queue manager.
//!
//! Owns the live queue of pending mutations, drains it through an
//! [`ActionDispatcher`] when online, and keeps the durable copy current.
//!
//! A drain takes a snapshot of the live queue and processes it oldest first.
//! Items enqueued during a drain wait in the live queue for the next cycle.
//! Items kept after a failure go back ahead of them, so enqueue order holds
//! across cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use super::dead_letter::{DeadLetter, DeadLetterReason};
use super::dispatcher::{dispatch_guarded, ActionDispatcher, DispatchOutcome};
use super::item::{MutationAction, MutationPayload, QueueItem};
use crate::config::QueueConfig;
use crate::error::LedgerError;
use crate::features::busy::BusyGuard;
use crate::features::conflict::{
    ConflictLog, ConflictResolver, ConflictSubject, EntitySnapshot, Resolution,
};
use crate::network::ConnectivityProvider;
use crate::storage::{keys, KeyValueStore, PersistentQueueStore};

const EVENT_CAPACITY: usize = 256;

/// Notifications for UI subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued { id: Uuid },
    Dispatched { id: Uuid },
    RetryScheduled { id: Uuid, retry_count: u32 },
    DeadLettered { id: Uuid, reason: DeadLetterReason },
    ConflictResolved { conflict_id: Uuid, decision: String },
    Cleared,
    DrainCompleted(DrainReport),
}

/// Counters for one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Dispatches attempted.
    pub attempted: usize,
    /// Items confirmed by the remote.
    pub succeeded: usize,
    /// Items kept in the live queue after a failure.
    pub retained: usize,
    /// Items moved to the dead-letter store.
    pub dead_lettered: usize,
    /// Conflicts detected and resolved.
    pub conflicts: usize,
    /// Items left untouched because connectivity dropped.
    pub deferred: usize,
    /// Another drain was already running.
    pub skipped: bool,
}

impl DrainReport {
    const fn skipped() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            retained: 0,
            dead_lettered: 0,
            conflicts: 0,
            deferred: 0,
            skipped: true,
        }
    }
}

/// Read-only view for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub is_online: bool,
    pub queue_length: usize,
    pub queue: Vec<QueueItem>,
    pub is_draining: bool,
    pub last_drain_at: Option<DateTime<Utc>>,
    pub dead_letter_count: usize,
    pub durability_degraded: bool,
}

#[derive(Default)]
pub(super) struct QueueState {
    /// Items waiting for the next drain.
    pub(super) live: Vec<QueueItem>,
    /// Remaining items of the snapshot being drained.
    in_flight: Vec<QueueItem>,
    /// Snapshot items kept after a failed attempt this cycle.
    retained: Vec<QueueItem>,
    pub(super) dead: Vec<DeadLetter>,
    last_drain_at: Option<DateTime<Utc>>,
    degraded: bool,
}

impl QueueState {
    /// Everything not yet confirmed, in enqueue order.
    fn pending(&self) -> Vec<QueueItem> {
        self.retained
            .iter()
            .chain(&self.in_flight)
            .chain(&self.live)
            .cloned()
            .collect()
    }
}

enum AfterConflict {
    /// Sent again with the override flag.
    Redispatched(DispatchOutcome),
    /// Remote version kept; local change dropped.
    Dropped,
    /// Moved to the dead-letter store for a user decision.
    Parked,
}

/// Settings the manager reads from [`QueueConfig`].
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_retries: u32,
    dispatch_timeout: Duration,
    cancel_on_disconnect: bool,
}

/// Queue of generic entity mutations.
pub struct MutationQueueManager {
    connectivity: Arc<dyn ConnectivityProvider>,
    dispatcher: Arc<dyn ActionDispatcher>,
    resolver: ConflictResolver,
    pub(super) conflicts: Arc<ConflictLog>,
    store: PersistentQueueStore<QueueItem>,
    dead_store: PersistentQueueStore<DeadLetter>,
    limits: Limits,
    pub(super) state: Mutex<QueueState>,
    draining: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

impl MutationQueueManager {
    /// Load the queue and its dead letters from durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored queue cannot be read or parsed.
    pub async fn open(
        kv: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivityProvider>,
        dispatcher: Arc<dyn ActionDispatcher>,
        conflicts: Arc<ConflictLog>,
        resolver: ConflictResolver,
        config: &QueueConfig,
    ) -> Result<Self, LedgerError> {
        let store = PersistentQueueStore::new(Arc::clone(&kv), keys::MUTATION_QUEUE);
        let dead_store = PersistentQueueStore::new(kv, keys::DEAD_LETTERS);

        let state = QueueState {
            live: store.load().await?,
            dead: dead_store.load().await?,
            ..QueueState::default()
        };
        tracing::debug!(
            pending = state.live.len(),
            dead = state.dead.len(),
            "mutation queue loaded"
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            connectivity,
            dispatcher,
            resolver,
            conflicts,
            store,
            dead_store,
            limits: Limits {
                max_retries: config.max_retries,
                dispatch_timeout: config.dispatch_timeout(),
                cancel_on_disconnect: config.cancel_on_disconnect,
            },
            state: Mutex::new(state),
            draining: AtomicBool::new(false),
            events,
        })
    }

    /// Subscribe to queue events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Queue a mutation, persist it, and drain right away when online.
    pub async fn enqueue(&self, action: MutationAction, payload: MutationPayload) -> QueueItem {
        let item = QueueItem::new(action, payload, self.limits.max_retries);
        {
            let mut state = self.state.lock().await;
            state.live.push(item.clone());
            self.persist_live(&mut state).await;
        }

        tracing::debug!(item = %item.id, action = %item.action, "mutation enqueued");
        self.emit(QueueEvent::Enqueued { id: item.id });
        self.drain_if_online().await;
        item
    }

    /// Dispatch every item queued at the start of the call.
    ///
    /// Does nothing when offline or when the queue is empty. A call made
    /// while another drain runs returns a report with `skipped` set.
    pub async fn drain(&self) -> DrainReport {
        if !self.connectivity.is_online() {
            return DrainReport::default();
        }
        let Some(running) = BusyGuard::try_acquire(&self.draining) else {
            tracing::debug!("drain already running");
            return DrainReport::skipped();
        };

        let report = self.drain_snapshot().await;
        drop(running);

        if report.attempted > 0 || report.deferred > 0 {
            tracing::info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                retained = report.retained,
                dead_lettered = report.dead_lettered,
                conflicts = report.conflicts,
                deferred = report.deferred,
                "drain finished"
            );
        }
        self.emit(QueueEvent::DrainCompleted(report));
        report
    }

    /// Reset every live item's retry count, then drain.
    pub async fn force_drain(&self) -> DrainReport {
        {
            let mut state = self.state.lock().await;
            for item in &mut state.live {
                item.retry_count = 0;
            }
            self.persist_live(&mut state).await;
        }
        self.drain().await
    }

    /// Snapshot of the queue for display.
    pub async fn get_status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        let queue = state.pending();
        QueueStatus {
            is_online: self.connectivity.is_online(),
            queue_length: queue.len(),
            queue,
            is_draining: self.draining.load(Ordering::SeqCst),
            last_drain_at: state.last_drain_at,
            dead_letter_count: state.dead.len(),
            durability_degraded: state.degraded || self.conflicts.is_degraded(),
        }
    }

    /// Pending items for one remote entity.
    pub async fn items_for_entity(&self, entity_id: &str) -> Vec<QueueItem> {
        self.state
            .lock()
            .await
            .pending()
            .into_iter()
            .filter(|item| item.payload.entity_id.as_deref() == Some(entity_id))
            .collect()
    }

    /// Discard all pending items and the durable queue.
    ///
    /// Dead letters are kept; they have their own discard operation.
    ///
    /// # Errors
    ///
    /// Returns `StorageDegraded` if the durable record could not be removed.
    pub async fn clear(&self) -> Result<usize, LedgerError> {
        let mut state = self.state.lock().await;
        let dropped = state.live.len() + state.in_flight.len() + state.retained.len();
        state.live.clear();
        state.in_flight.clear();
        state.retained.clear();

        let result = self.store.clear().await;
        state.degraded = result.is_err();
        drop(state);

        tracing::info!(dropped, "mutation queue cleared");
        self.emit(QueueEvent::Cleared);
        result.map(|()| dropped)
    }

    pub(super) async fn drain_if_online(&self) {
        if self.connectivity.is_online() {
            self.drain().await;
        }
    }

    pub(super) fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn drain_snapshot(&self) -> DrainReport {
        let mut report = DrainReport::default();
        {
            let mut state = self.state.lock().await;
            // An abandoned drain leaves its snapshot behind; it goes first
            let mut snapshot = std::mem::take(&mut state.retained);
            snapshot.append(&mut state.in_flight);
            snapshot.append(&mut state.live);
            if snapshot.is_empty() {
                return report;
            }
            state.in_flight = snapshot;
        }

        loop {
            let next = self.state.lock().await.in_flight.first().cloned();
            let Some(item) = next else { break };

            if !self.connectivity.is_online() {
                let mut state = self.state.lock().await;
                let rest = std::mem::take(&mut state.in_flight);
                report.deferred = rest.len();
                tracing::info!(deferred = rest.len(), "connectivity lost, deferring rest of drain");
                state.retained.extend(rest);
                break;
            }

            report.attempted += 1;
            let outcome = self.attempt(&item).await;
            self.settle(item, outcome, &mut report).await;
        }

        let mut state = self.state.lock().await;
        let mut live = std::mem::take(&mut state.retained);
        live.append(&mut state.live);
        state.live = live;
        state.last_drain_at = Some(Utc::now());
        self.persist_live(&mut state).await;
        report
    }

    async fn attempt(&self, item: &QueueItem) -> DispatchOutcome {
        let cancel = self
            .limits
            .cancel_on_disconnect
            .then(|| self.connectivity.connection_token());
        dispatch_guarded(
            self.dispatcher.as_ref(),
            item,
            self.limits.dispatch_timeout,
            cancel,
        )
        .await
    }

    /// Book the outcome of one dispatch and persist the result.
    async fn settle(&self, mut item: QueueItem, outcome: DispatchOutcome, report: &mut DrainReport) {
        let outcome = match outcome {
            DispatchOutcome::Conflict(remote) => {
                report.conflicts += 1;
                match self.resolve(&mut item, remote).await {
                    AfterConflict::Redispatched(outcome) => outcome,
                    AfterConflict::Dropped => {
                        self.finish(item.id, None, None).await;
                        return;
                    }
                    AfterConflict::Parked => {
                        report.dead_lettered += 1;
                        return;
                    }
                }
            }
            other => other,
        };

        match outcome {
            DispatchOutcome::Success => {
                report.succeeded += 1;
                tracing::debug!(item = %item.id, action = %item.action, "mutation dispatched");
                self.emit(QueueEvent::Dispatched { id: item.id });
                self.finish(item.id, None, None).await;
            }
            DispatchOutcome::Failure(failure) => {
                item.record_failure(failure.message.clone());
                tracing::warn!(
                    item = %item.id,
                    action = %item.action,
                    retry_count = item.retry_count,
                    error = %failure,
                    "dispatch failed"
                );

                if item.within_ceiling() {
                    report.retained += 1;
                    self.emit(QueueEvent::RetryScheduled {
                        id: item.id,
                        retry_count: item.retry_count,
                    });
                    self.finish(item.id, Some(item), None).await;
                } else {
                    report.dead_lettered += 1;
                    self.dead_letter(item, DeadLetterReason::RetriesExhausted).await;
                }
            }
            DispatchOutcome::Conflict(_) => {
                // Override was refused; count it against the retry budget
                item.record_failure("conflict persisted after override");
                if item.within_ceiling() {
                    report.retained += 1;
                    self.finish(item.id, Some(item), None).await;
                } else {
                    report.dead_lettered += 1;
                    self.dead_letter(item, DeadLetterReason::RetriesExhausted).await;
                }
            }
        }
    }

    /// Resolve a conflict on `item` and apply the decision.
    async fn resolve(&self, item: &mut QueueItem, remote: EntitySnapshot) -> AfterConflict {
        let subject = ConflictSubject {
            entity: item.action.entity(),
            entity_id: item.payload.entity_id.clone(),
            local_ref: item.id.to_string(),
        };
        let conflict = self.resolver.resolve(subject, item.local_snapshot(), remote);
        let conflict_id = conflict.id;
        let resolution = conflict.resolution.clone();
        self.conflicts.record(conflict).await;
        self.emit(QueueEvent::ConflictResolved {
            conflict_id,
            decision: resolution.label().to_string(),
        });

        match resolution {
            Resolution::KeepRemote => AfterConflict::Dropped,
            Resolution::Manual => {
                let reason = DeadLetterReason::AwaitingConflictDecision { conflict_id };
                self.dead_letter(item.clone(), reason).await;
                AfterConflict::Parked
            }
            Resolution::KeepLocal => {
                item.conflict_override = true;
                AfterConflict::Redispatched(self.attempt(item).await)
            }
            Resolution::Merge(data) => {
                item.payload.data = data;
                item.conflict_override = true;
                AfterConflict::Redispatched(self.attempt(item).await)
            }
        }
    }

    async fn dead_letter(&self, item: QueueItem, reason: DeadLetterReason) {
        let id = item.id;
        tracing::warn!(
            item = %id,
            action = %item.action,
            last_error = item.last_error.as_deref().unwrap_or("-"),
            %reason,
            "mutation dead-lettered"
        );
        self.emit(QueueEvent::DeadLettered {
            id,
            reason: reason.clone(),
        });
        self.finish(id, None, Some(DeadLetter::new(item, reason))).await;
    }

    /// Take a snapshot item out of flight, optionally retaining it or
    /// moving it to the dead-letter store.
    async fn finish(&self, id: Uuid, retain: Option<QueueItem>, dead: Option<DeadLetter>) {
        let mut state = self.state.lock().await;
        let Some(position) = state.in_flight.iter().position(|item| item.id == id) else {
            // Cleared while in flight
            return;
        };
        state.in_flight.remove(position);

        if let Some(item) = retain {
            state.retained.push(item);
        }
        if let Some(letter) = dead {
            state.dead.push(letter);
            self.persist_all(&mut state).await;
        } else {
            self.persist_live(&mut state).await;
        }
    }

    async fn persist_live(&self, state: &mut QueueState) {
        let pending = state.pending();
        if let Err(e) = self.store.save(&pending).await {
            tracing::warn!(error = %e, "mutation queue not persisted");
            state.degraded = true;
        } else {
            state.degraded = false;
        }
    }

    pub(super) async fn persist_dead(&self, state: &mut QueueState) {
        if let Err(e) = self.dead_store.save(&state.dead).await {
            tracing::warn!(error = %e, "dead letters not persisted");
            state.degraded = true;
        }
    }

    pub(super) async fn persist_all(&self, state: &mut QueueState) {
        self.persist_dead(state).await;
        let dead_failed = state.degraded;
        self.persist_live(state).await;
        state.degraded |= dead_failed;
    }
}
