//! Payment queue manager.
//!
//! Payments follow their own status machine and are never dropped after a
//! failure: a failed payment waits for an explicit `retry` or `cancel`, and
//! `retry` reports `RetryExhausted` once the budget is spent.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::analytics::PaymentAnalytics;
use super::gateway::{GatewayOutcome, PaymentGateway};
use super::payment::{
    format_minor, Cancellation, Capture, CaptureData, OfflinePayment, PaymentRequest,
    PaymentStatus, MAX_AMOUNT,
};
use crate::config::PaymentConfig;
use crate::error::LedgerError;
use crate::features::busy::{BusyGuard, InFlight};
use crate::features::conflict::{
    ConflictLog, ConflictResolver, ConflictSubject, EntityKind, EntitySnapshot, Resolution,
};
use crate::network::ConnectivityProvider;
use crate::storage::{keys, KeyValueStore, PersistentQueueStore};

/// Outcome for one payment in a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSyncResult {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub success: bool,
    pub error: Option<String>,
    /// Not attempted (failed payments wait for `retry`).
    pub skipped: bool,
}

/// Per-payment report for `sync_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The pass did not run (offline, or another pass was running).
    pub not_run: bool,
    pub results: Vec<PaymentSyncResult>,
}

impl SyncReport {
    /// Add a result.
    pub fn add(&mut self, result: PaymentSyncResult) {
        if result.skipped {
            self.skipped += 1;
        } else if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Get total payments processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    const fn not_run() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            skipped: 0,
            not_run: true,
            results: Vec::new(),
        }
    }
}

enum Settle {
    Outcome(GatewayOutcome),
    /// Waiting on a user decision for this conflict.
    Parked(Uuid),
}

#[derive(Default)]
struct PaymentState {
    payments: Vec<OfflinePayment>,
    degraded: bool,
}

/// Queue of offline payments.
pub struct PaymentQueueManager {
    connectivity: Arc<dyn ConnectivityProvider>,
    gateway: Arc<dyn PaymentGateway>,
    resolver: ConflictResolver,
    conflicts: Arc<ConflictLog>,
    store: PersistentQueueStore<OfflinePayment>,
    max_retries: u32,
    call_timeout: Duration,
    state: Mutex<PaymentState>,
    syncing: AtomicBool,
    /// Payments with a gateway submit running.
    submitting: InFlight<Uuid>,
}

impl PaymentQueueManager {
    /// Load payments from durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored payments cannot be read or parsed.
    pub async fn open(
        kv: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivityProvider>,
        gateway: Arc<dyn PaymentGateway>,
        conflicts: Arc<ConflictLog>,
        resolver: ConflictResolver,
        config: &PaymentConfig,
    ) -> Result<Self, LedgerError> {
        let store = PersistentQueueStore::new(kv, keys::PAYMENTS);
        let payments = store.load().await?;
        tracing::debug!(payments = payments.len(), "payment queue loaded");

        Ok(Self {
            connectivity,
            gateway,
            resolver,
            conflicts,
            store,
            max_retries: config.max_retries,
            call_timeout: config.call_timeout(),
            state: Mutex::new(PaymentState {
                payments,
                degraded: false,
            }),
            syncing: AtomicBool::new(false),
            submitting: InFlight::default(),
        })
    }

    /// Create a `queued` payment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` if the request fails validation.
    pub async fn queue_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<OfflinePayment, LedgerError> {
        request.validate()?;
        let payment = OfflinePayment::new(request, self.max_retries);

        let mut state = self.state.lock().await;
        state.payments.push(payment.clone());
        self.persist(&mut state).await;

        tracing::info!(payment = %payment.id, amount = payment.amount, currency = %payment.currency, "payment queued");
        Ok(payment)
    }

    /// Attach offline capture evidence and move `queued -> captured_offline`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `PaymentTerminal`, `InvalidTransition` when the
    /// payment is not `queued`, or `InvalidPayload` for an out-of-range amount.
    pub async fn capture_offline(
        &self,
        payment_id: Uuid,
        data: CaptureData,
    ) -> Result<Capture, LedgerError> {
        let mut state = self.state.lock().await;
        let payment = find_mut(&mut state.payments, payment_id)?;

        let capture = Capture {
            amount: data.amount.unwrap_or(payment.amount),
            method: data.method.unwrap_or(payment.method),
            evidence: data.evidence,
            captured_at: Utc::now(),
        };
        if !(1..=MAX_AMOUNT).contains(&capture.amount) {
            return Err(LedgerError::InvalidPayload(format!(
                "captured amount must be between 0.01 and {}",
                format_minor(MAX_AMOUNT)
            )));
        }

        payment.transition(PaymentStatus::CapturedOffline)?;
        payment.capture = Some(capture.clone());
        self.persist(&mut state).await;

        tracing::info!(payment = %payment_id, "payment captured offline");
        Ok(capture)
    }

    /// Attempt to sync every payment that is not terminal.
    ///
    /// `failed` payments are reported as skipped; they need `retry`. One
    /// payment's failure never stops the others.
    pub async fn sync_all(&self) -> SyncReport {
        if !self.connectivity.is_online() {
            return SyncReport::not_run();
        }
        let Some(_running) = BusyGuard::try_acquire(&self.syncing) else {
            tracing::debug!("payment sync already running");
            return SyncReport::not_run();
        };

        let candidates: Vec<(Uuid, PaymentStatus)> = self
            .state
            .lock()
            .await
            .payments
            .iter()
            .filter(|p| !p.status.is_terminal())
            .map(|p| (p.id, p.status))
            .collect();

        let mut report = SyncReport::default();
        for (id, status) in candidates {
            if status == PaymentStatus::Failed {
                report.add(PaymentSyncResult {
                    payment_id: id,
                    status,
                    success: false,
                    error: None,
                    skipped: true,
                });
                continue;
            }
            report.add(self.sync_one(id).await);
        }

        if report.total() > 0 {
            tracing::info!(
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "payment sync finished"
            );
        }
        report
    }

    /// Spend one retry and sync the payment again.
    ///
    /// When offline the payment is left `queued` for the next pass.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `PaymentTerminal` for `synced`/`cancelled`
    /// payments, `SyncInProgress` while a submit for it is running, and
    /// `RetryExhausted` once `retry_count >= max_retries`.
    pub async fn retry(&self, payment_id: Uuid) -> Result<OfflinePayment, LedgerError> {
        {
            let mut state = self.state.lock().await;
            let payment = find_mut(&mut state.payments, payment_id)?;

            if payment.status.is_terminal() {
                return Err(LedgerError::PaymentTerminal {
                    payment_id: payment_id.to_string(),
                    status: payment.status,
                });
            }
            if self.submitting.contains(&payment_id) {
                return Err(LedgerError::SyncInProgress(format!("payment {payment_id}")));
            }
            if !payment.retries_left() {
                tracing::warn!(payment = %payment_id, retry_count = payment.retry_count, "payment retries exhausted");
                return Err(LedgerError::RetryExhausted {
                    payment_id: payment_id.to_string(),
                    retry_count: payment.retry_count,
                    max_retries: payment.max_retries,
                });
            }

            payment.retry_count += 1;
            payment.last_retry_at = Some(Utc::now());
            if payment.status == PaymentStatus::Failed {
                payment.transition(PaymentStatus::Queued)?;
            }
            self.persist(&mut state).await;
        }

        if self.connectivity.is_online() {
            self.sync_one(payment_id).await;
        }
        self.get(payment_id).await
    }

    /// Cancel a payment that has not reached a terminal state.
    ///
    /// No retry ceiling applies. If the payment had already been submitted
    /// and the device is online, the remote is told on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `PaymentTerminal` for `synced`/`cancelled`.
    pub async fn cancel(
        &self,
        payment_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<OfflinePayment, LedgerError> {
        let cancelled = {
            let mut state = self.state.lock().await;
            let payment = find_mut(&mut state.payments, payment_id)?;

            payment.transition(PaymentStatus::Cancelled)?;
            payment.cancellation = Some(Cancellation {
                reason: reason.into(),
                cancelled_at: Utc::now(),
            });
            payment.pending_conflict = None;
            let cancelled = payment.clone();
            self.persist(&mut state).await;
            cancelled
        };
        tracing::info!(payment = %payment_id, "payment cancelled");

        if cancelled.submitted && self.connectivity.is_online() {
            match self.call(self.gateway.cancel(&cancelled)).await {
                GatewayOutcome::Accepted { .. } => {
                    tracing::debug!(payment = %payment_id, "remote cancel acknowledged");
                }
                GatewayOutcome::Rejected(error) => {
                    tracing::warn!(payment = %payment_id, %error, "remote cancel failed");
                }
                GatewayOutcome::Conflict(_) => {
                    tracing::warn!(payment = %payment_id, "remote refused cancel with a conflict");
                }
            }
        }
        Ok(cancelled)
    }

    /// Apply a user's decision to a payment parked on a conflict.
    ///
    /// # Errors
    ///
    /// Returns the conflict log's error for unknown or settled conflicts.
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        decision: Resolution,
    ) -> Result<Option<OfflinePayment>, LedgerError> {
        let conflict = self.conflicts.resolve_manually(conflict_id, decision).await?;

        let payment_id = {
            let mut state = self.state.lock().await;
            let Some(payment) = state
                .payments
                .iter_mut()
                .find(|p| p.pending_conflict == Some(conflict_id))
            else {
                return Ok(None);
            };
            payment.pending_conflict = None;
            let id = payment.id;

            match conflict.resolution {
                Resolution::KeepRemote => {
                    payment.transition(PaymentStatus::PendingSync).ok();
                    accept_remote(payment, &conflict.remote);
                }
                _ => {
                    payment.conflict_override = true;
                    payment.transition(PaymentStatus::Queued)?;
                }
            }
            self.persist(&mut state).await;
            id
        };

        if self.connectivity.is_online() {
            let status = self.get(payment_id).await?.status;
            if status == PaymentStatus::Queued {
                self.sync_one(payment_id).await;
            }
        }
        self.get(payment_id).await.map(Some)
    }

    /// Look up one payment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get(&self, payment_id: Uuid) -> Result<OfflinePayment, LedgerError> {
        self.state
            .lock()
            .await
            .payments
            .iter()
            .find(|p| p.id == payment_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("payment {payment_id}")))
    }

    /// All payments, optionally filtered by status, oldest first.
    pub async fn list(&self, status: Option<PaymentStatus>) -> Vec<OfflinePayment> {
        self.state
            .lock()
            .await
            .payments
            .iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect()
    }

    /// Remove terminal payments last updated more than `older_than` ago.
    pub async fn purge_terminal(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut state = self.state.lock().await;
        let before = state.payments.len();
        state
            .payments
            .retain(|p| !(p.status.is_terminal() && p.updated_at < cutoff));
        let purged = before - state.payments.len();

        if purged > 0 {
            self.persist(&mut state).await;
            tracing::info!(purged, "terminal payments purged");
        }
        purged
    }

    /// Aggregate figures for dashboards.
    pub async fn analytics(&self) -> PaymentAnalytics {
        PaymentAnalytics::from_payments(&self.state.lock().await.payments)
    }

    /// Whether the last durable write failed.
    pub async fn is_degraded(&self) -> bool {
        self.state.lock().await.degraded || self.conflicts.is_degraded()
    }

    /// Submit one payment and book the outcome.
    async fn sync_one(&self, payment_id: Uuid) -> PaymentSyncResult {
        let (payment, _claim) = {
            let mut state = self.state.lock().await;
            let payment = match find_mut(&mut state.payments, payment_id) {
                Ok(payment) => payment,
                Err(e) => return failed_result(payment_id, PaymentStatus::Queued, e.to_string()),
            };
            let Some(claim) = self.submitting.try_claim(payment_id) else {
                tracing::debug!(payment = %payment_id, "submit already running");
                return PaymentSyncResult {
                    payment_id,
                    status: payment.status,
                    success: false,
                    error: None,
                    skipped: true,
                };
            };
            // A crash can leave a payment pending; resubmit it as is
            if payment.status != PaymentStatus::PendingSync {
                if let Err(e) = payment.transition(PaymentStatus::PendingSync) {
                    return failed_result(payment_id, payment.status, e.to_string());
                }
            }
            payment.submitted = true;
            let payment = payment.clone();
            self.persist(&mut state).await;
            (payment, claim)
        };

        let settle = match self.call(self.gateway.submit(&payment)).await {
            GatewayOutcome::Conflict(remote) => self.resolve(&payment, remote).await,
            other => Settle::Outcome(other),
        };

        let mut state = self.state.lock().await;
        let Ok(stored) = find_mut(&mut state.payments, payment_id) else {
            return failed_result(payment_id, payment.status, "payment removed during sync".into());
        };
        if stored.status != PaymentStatus::PendingSync {
            // Cancelled or resolved while the call was in flight
            let status = stored.status;
            return PaymentSyncResult {
                payment_id,
                status,
                success: status == PaymentStatus::Synced,
                error: None,
                skipped: false,
            };
        }

        let result = match settle {
            Settle::Outcome(GatewayOutcome::Accepted { remote_ref }) => {
                stored.remote_ref = remote_ref;
                stored.synced_at = Some(Utc::now());
                stored.last_error = None;
                stored.conflict_override = false;
                stored.transition(PaymentStatus::Synced).ok();
                tracing::info!(payment = %payment_id, "payment synced");
                PaymentSyncResult {
                    payment_id,
                    status: stored.status,
                    success: true,
                    error: None,
                    skipped: false,
                }
            }
            Settle::Outcome(GatewayOutcome::Rejected(error)) => {
                stored.last_error = Some(error.clone());
                stored.transition(PaymentStatus::Failed).ok();
                tracing::warn!(payment = %payment_id, %error, "payment sync failed");
                PaymentSyncResult {
                    payment_id,
                    status: stored.status,
                    success: false,
                    error: Some(error),
                    skipped: false,
                }
            }
            Settle::Outcome(GatewayOutcome::Conflict(_)) => {
                let error = "unresolved conflict".to_string();
                stored.last_error = Some(error.clone());
                stored.transition(PaymentStatus::Failed).ok();
                failed_result(payment_id, stored.status, error)
            }
            Settle::Parked(conflict_id) => {
                park(stored, conflict_id);
                failed_result(payment_id, stored.status, format!("awaiting decision on conflict {conflict_id}"))
            }
        };
        self.persist(&mut state).await;
        result
    }

    /// Resolve a conflict on a submitted payment.
    async fn resolve(&self, payment: &OfflinePayment, remote: EntitySnapshot) -> Settle {
        let local = EntitySnapshot {
            data: serde_json::to_value(payment).unwrap_or_default(),
            modified_at: Some(payment.updated_at),
            changed_fields: None,
            deleted: false,
        };
        let subject = ConflictSubject {
            entity: EntityKind::Payment,
            entity_id: payment.remote_ref.clone(),
            local_ref: payment.id.to_string(),
        };
        let conflict = self.resolver.resolve(subject, local, remote.clone());
        let resolution = conflict.resolution.clone();
        let conflict_id = conflict.id;
        self.conflicts.record(conflict).await;

        match resolution {
            Resolution::KeepRemote => Settle::Outcome(GatewayOutcome::Accepted {
                remote_ref: remote_reference(&remote),
            }),
            // Payment fields are typed; a merge is sent as the local record
            Resolution::KeepLocal | Resolution::Merge(_) => {
                let mut forced = payment.clone();
                forced.conflict_override = true;
                Settle::Outcome(match self.call(self.gateway.submit(&forced)).await {
                    GatewayOutcome::Conflict(_) => {
                        GatewayOutcome::Rejected("conflict persisted after override".to_string())
                    }
                    other => other,
                })
            }
            Resolution::Manual => Settle::Parked(conflict_id),
        }
    }

    async fn call(&self, call: impl std::future::Future<Output = GatewayOutcome>) -> GatewayOutcome {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| {
                GatewayOutcome::Rejected(format!(
                    "no response within {}s",
                    self.call_timeout.as_secs()
                ))
            })
    }

    async fn persist(&self, state: &mut PaymentState) {
        if let Err(e) = self.store.save(&state.payments).await {
            tracing::warn!(error = %e, "payments not persisted");
            state.degraded = true;
        } else {
            state.degraded = false;
        }
    }
}

fn find_mut(
    payments: &mut [OfflinePayment],
    payment_id: Uuid,
) -> Result<&mut OfflinePayment, LedgerError> {
    payments
        .iter_mut()
        .find(|p| p.id == payment_id)
        .ok_or_else(|| LedgerError::NotFound(format!("payment {payment_id}")))
}

fn failed_result(payment_id: Uuid, status: PaymentStatus, error: String) -> PaymentSyncResult {
    PaymentSyncResult {
        payment_id,
        status,
        success: false,
        error: Some(error),
        skipped: false,
    }
}

/// Mark a payment as waiting on a manual conflict decision.
fn park(payment: &mut OfflinePayment, conflict_id: Uuid) {
    payment.pending_conflict = Some(conflict_id);
    payment.last_error = Some(format!("awaiting decision on conflict {conflict_id}"));
    payment.transition(PaymentStatus::Failed).ok();
    tracing::warn!(payment = %payment.id, conflict = %conflict_id, "payment parked on conflict");
}

fn remote_reference(remote: &EntitySnapshot) -> Option<String> {
    ["reference", "id"]
        .iter()
        .find_map(|key| remote.data.get(*key).and_then(serde_json::Value::as_str))
        .map(ToString::to_string)
}

/// Record the remote's version as the outcome of a payment.
fn accept_remote(payment: &mut OfflinePayment, remote: &EntitySnapshot) {
    payment.remote_ref = remote_reference(remote).or_else(|| payment.remote_ref.take());
    payment.synced_at = Some(Utc::now());
    payment.last_error = None;
    payment.transition(PaymentStatus::Synced).ok();
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::features::conflict::ConflictPolicy;
    use crate::features::payments::gateway::MockPaymentGateway;
    use crate::features::payments::PaymentMethod;
    use crate::network::NetworkStateMonitor;
    use crate::storage::MemoryKvStore;

    /// Gateway that replays scripted submit outcomes and records calls.
    #[derive(Default)]
    struct Scripted {
        submits: std::sync::Mutex<VecDeque<GatewayOutcome>>,
        fallback: Option<GatewayOutcome>,
        submitted: std::sync::Mutex<Vec<OfflinePayment>>,
        cancelled: std::sync::Mutex<Vec<OfflinePayment>>,
        /// Holds each submit until a permit is added.
        gate: Option<Arc<Semaphore>>,
    }

    impl Scripted {
        fn always(outcome: GatewayOutcome) -> Self {
            Self {
                fallback: Some(outcome),
                ..Self::default()
            }
        }

        fn then(self, outcome: GatewayOutcome) -> Self {
            self.submits.lock().unwrap().push_back(outcome);
            self
        }

        fn submitted(&self) -> Vec<OfflinePayment> {
            self.submitted.lock().unwrap().clone()
        }

        fn cancel_calls(&self) -> usize {
            self.cancelled.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PaymentGateway for Scripted {
        async fn submit(&self, payment: &OfflinePayment) -> GatewayOutcome {
            self.submitted.lock().unwrap().push(payment.clone());
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            let scripted = self.submits.lock().unwrap().pop_front();
            scripted
                .or_else(|| self.fallback.clone())
                .unwrap_or(GatewayOutcome::Accepted { remote_ref: None })
        }

        async fn cancel(&self, payment: &OfflinePayment) -> GatewayOutcome {
            self.cancelled.lock().unwrap().push(payment.clone());
            GatewayOutcome::Accepted { remote_ref: None }
        }
    }

    fn accepted(reference: &str) -> GatewayOutcome {
        GatewayOutcome::Accepted {
            remote_ref: Some(reference.to_string()),
        }
    }

    fn rejected() -> GatewayOutcome {
        GatewayOutcome::Rejected("HTTP 500".to_string())
    }

    fn remote_conflict() -> GatewayOutcome {
        GatewayOutcome::Conflict(EntitySnapshot {
            data: json!({"reference": "pay_remote", "amount": 4000}),
            modified_at: Some(Utc::now() + chrono::Duration::hours(1)),
            changed_fields: None,
            deleted: false,
        })
    }

    fn request(amount: i64) -> PaymentRequest {
        PaymentRequest {
            amount,
            currency: "USD".to_string(),
            recipient: "Corner Shop".to_string(),
            description: Some("Supplies".to_string()),
            method: PaymentMethod::Cash,
        }
    }

    struct Harness {
        kv: Arc<dyn KeyValueStore>,
        monitor: Arc<NetworkStateMonitor>,
        conflicts: Arc<ConflictLog>,
    }

    impl Harness {
        async fn new(online: bool) -> Self {
            let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
            let conflicts = Arc::new(ConflictLog::open(Arc::clone(&kv)).await.unwrap());
            Self {
                kv,
                monitor: Arc::new(NetworkStateMonitor::new(Some(online))),
                conflicts,
            }
        }

        async fn manager(
            &self,
            gateway: Arc<dyn PaymentGateway>,
            policy: ConflictPolicy,
        ) -> PaymentQueueManager {
            PaymentQueueManager::open(
                Arc::clone(&self.kv),
                self.monitor.clone(),
                gateway,
                Arc::clone(&self.conflicts),
                ConflictResolver::new(policy),
                &PaymentConfig::default(),
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn test_queue_and_capture_offline() {
        let harness = Harness::new(false).await;
        let manager = harness
            .manager(Arc::new(Scripted::default()), ConflictPolicy::default())
            .await;

        let payment = manager.queue_payment(request(4200)).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Queued);

        let capture = manager
            .capture_offline(
                payment.id,
                CaptureData {
                    evidence: Some("receipt 0042".to_string()),
                    ..CaptureData::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(capture.amount, 4200);
        assert_eq!(capture.method, PaymentMethod::Cash);

        let stored = manager.get(payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::CapturedOffline);
        assert_eq!(stored.capture, Some(capture));

        let err = manager
            .capture_offline(payment.id, CaptureData::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_invalid_request_not_queued() {
        let harness = Harness::new(false).await;
        let manager = harness
            .manager(Arc::new(Scripted::default()), ConflictPolicy::default())
            .await;

        let err = manager.queue_payment(request(0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPayload(_)));
        assert!(manager.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_offline_does_not_run() {
        let harness = Harness::new(false).await;
        let gateway = Arc::new(Scripted::default());
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::default())
            .await;
        manager.queue_payment(request(100)).await.unwrap();

        let report = manager.sync_all().await;
        assert!(report.not_run);
        assert!(gateway.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_isolates_failures() {
        let harness = Harness::new(false).await;
        let gateway = Arc::new(
            Scripted::default()
                .then(accepted("pay_1"))
                .then(rejected())
                .then(accepted("pay_3")),
        );
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::default())
            .await;

        let first = manager.queue_payment(request(100)).await.unwrap();
        let second = manager.queue_payment(request(200)).await.unwrap();
        let third = manager.queue_payment(request(300)).await.unwrap();

        harness.monitor.report(true);
        let report = manager.sync_all().await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(gateway.submitted().len(), 3);

        let first = manager.get(first.id).await.unwrap();
        assert_eq!(first.status, PaymentStatus::Synced);
        assert_eq!(first.remote_ref.as_deref(), Some("pay_1"));
        assert!(first.synced_at.is_some());

        let second = manager.get(second.id).await.unwrap();
        assert_eq!(second.status, PaymentStatus::Failed);
        assert_eq!(second.last_error.as_deref(), Some("HTTP 500"));

        assert_eq!(
            manager.get(third.id).await.unwrap().status,
            PaymentStatus::Synced
        );

        // Failed payments wait for an explicit retry
        let report = manager.sync_all().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(gateway.submitted().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_during_running_submit_is_refused() {
        let harness = Harness::new(false).await;
        let gate = Arc::new(Semaphore::new(0));
        let gateway = Arc::new(Scripted {
            gate: Some(Arc::clone(&gate)),
            ..Scripted::default()
        });
        let manager = Arc::new(
            harness
                .manager(gateway.clone(), ConflictPolicy::default())
                .await,
        );
        let payment = manager.queue_payment(request(2500)).await.unwrap();
        harness.monitor.report(true);

        let syncing = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.sync_all().await })
        };
        while gateway.submitted().is_empty() {
            tokio::task::yield_now().await;
        }

        let err = manager.retry(payment.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::SyncInProgress(_)));
        assert_eq!(manager.get(payment.id).await.unwrap().retry_count, 0);

        gate.add_permits(1);
        assert_eq!(syncing.await.unwrap().succeeded, 1);
        assert_eq!(gateway.submitted().len(), 1);
        assert_eq!(
            manager.get(payment.id).await.unwrap().status,
            PaymentStatus::Synced
        );
    }

    #[tokio::test]
    async fn test_abandoned_sync_can_run_again() {
        let harness = Harness::new(true).await;
        let gate = Arc::new(Semaphore::new(0));
        let gateway = Arc::new(Scripted {
            gate: Some(Arc::clone(&gate)),
            ..Scripted::default()
        });
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::default())
            .await;
        let payment = manager.queue_payment(request(900)).await.unwrap();

        let abandoned = tokio::time::timeout(Duration::from_millis(10), manager.sync_all()).await;
        assert!(abandoned.is_err());
        assert_eq!(
            manager.get(payment.id).await.unwrap().status,
            PaymentStatus::PendingSync
        );

        gate.add_permits(1);
        let report = manager.sync_all().await;
        assert!(!report.not_run);
        assert_eq!(report.succeeded, 1);
        assert_eq!(gateway.submitted().len(), 2);
        assert_eq!(
            manager.get(payment.id).await.unwrap().status,
            PaymentStatus::Synced
        );
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let harness = Harness::new(true).await;
        let mut mock = MockPaymentGateway::new();
        mock.expect_submit().times(4).returning(|_| rejected());
        let manager = harness
            .manager(Arc::new(mock), ConflictPolicy::default())
            .await;

        let payment = manager.queue_payment(request(1500)).await.unwrap();
        manager.sync_all().await;

        for attempt in 1..=3 {
            let retried = manager.retry(payment.id).await.unwrap();
            assert_eq!(retried.retry_count, attempt);
            assert_eq!(retried.status, PaymentStatus::Failed);
            assert!(retried.last_retry_at.is_some());
        }

        let err = manager.retry(payment.id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::RetryExhausted {
                retry_count: 3,
                max_retries: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_retry_offline_requeues() {
        let harness = Harness::new(true).await;
        let gateway = Arc::new(Scripted::default().then(rejected()));
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::default())
            .await;

        let payment = manager.queue_payment(request(100)).await.unwrap();
        manager.sync_all().await;
        harness.monitor.report(false);

        let retried = manager.retry(payment.id).await.unwrap();
        assert_eq!(retried.status, PaymentStatus::Queued);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(gateway.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_payment_is_terminal() {
        let harness = Harness::new(false).await;
        let gateway = Arc::new(Scripted::default());
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::default())
            .await;

        let payment = manager.queue_payment(request(900)).await.unwrap();
        let cancelled = manager
            .cancel(payment.id, "customer requested")
            .await
            .unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert_eq!(
            cancelled.cancellation.map(|c| c.reason).as_deref(),
            Some("customer requested")
        );

        let err = manager.retry(payment.id).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PaymentTerminal {
                status: PaymentStatus::Cancelled,
                ..
            }
        ));
        let err = manager.cancel(payment.id, "again").await.unwrap_err();
        assert!(matches!(err, LedgerError::PaymentTerminal { .. }));

        // Never submitted, so the remote is not told
        assert_eq!(gateway.cancel_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_submit_notifies_remote() {
        let harness = Harness::new(true).await;
        let gateway = Arc::new(Scripted::always(rejected()));
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::default())
            .await;

        let payment = manager.queue_payment(request(100)).await.unwrap();
        manager.sync_all().await;
        assert!(manager.get(payment.id).await.unwrap().submitted);

        manager.cancel(payment.id, "duplicate").await.unwrap();
        assert_eq!(gateway.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn test_payments_survive_restart() {
        let harness = Harness::new(false).await;
        let manager = harness
            .manager(Arc::new(Scripted::default()), ConflictPolicy::default())
            .await;
        let payment = manager.queue_payment(request(100)).await.unwrap();
        manager
            .capture_offline(payment.id, CaptureData::default())
            .await
            .unwrap();
        manager.queue_payment(request(200)).await.unwrap();
        drop(manager);

        let reopened = harness
            .manager(Arc::new(Scripted::default()), ConflictPolicy::default())
            .await;
        let payments = reopened.list(None).await;
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].id, payment.id);
        assert_eq!(payments[0].status, PaymentStatus::CapturedOffline);
        assert_eq!(
            reopened.list(Some(PaymentStatus::Queued)).await.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_purge_terminal() {
        let harness = Harness::new(false).await;
        let manager = harness
            .manager(Arc::new(Scripted::default()), ConflictPolicy::default())
            .await;
        let cancelled = manager.queue_payment(request(100)).await.unwrap();
        manager.queue_payment(request(200)).await.unwrap();
        manager.cancel(cancelled.id, "mistake").await.unwrap();

        assert_eq!(manager.purge_terminal(chrono::Duration::days(30)).await, 0);
        assert_eq!(manager.purge_terminal(chrono::Duration::zero()).await, 1);
        assert_eq!(manager.list(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_server_wins_conflict_marks_synced() {
        let harness = Harness::new(true).await;
        let gateway = Arc::new(Scripted::default().then(remote_conflict()));
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::ServerWins)
            .await;

        let payment = manager.queue_payment(request(4200)).await.unwrap();
        let report = manager.sync_all().await;
        assert_eq!(report.succeeded, 1);

        let synced = manager.get(payment.id).await.unwrap();
        assert_eq!(synced.status, PaymentStatus::Synced);
        assert_eq!(synced.remote_ref.as_deref(), Some("pay_remote"));
        assert_eq!(gateway.submitted().len(), 1);
        assert_eq!(harness.conflicts.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_client_wins_resubmits_with_override() {
        let harness = Harness::new(true).await;
        let gateway = Arc::new(
            Scripted::default()
                .then(remote_conflict())
                .then(accepted("pay_forced")),
        );
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::ClientWins)
            .await;

        let payment = manager.queue_payment(request(4200)).await.unwrap();
        manager.sync_all().await;

        let submitted = gateway.submitted();
        assert_eq!(submitted.len(), 2);
        assert!(!submitted[0].conflict_override);
        assert!(submitted[1].conflict_override);

        let synced = manager.get(payment.id).await.unwrap();
        assert_eq!(synced.status, PaymentStatus::Synced);
        assert_eq!(synced.remote_ref.as_deref(), Some("pay_forced"));
        assert!(!synced.conflict_override);
    }

    #[tokio::test]
    async fn test_manual_conflict_parks_until_decided() {
        let harness = Harness::new(true).await;
        let gateway = Arc::new(
            Scripted::default()
                .then(remote_conflict())
                .then(accepted("pay_local")),
        );
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::Manual)
            .await;

        let payment = manager.queue_payment(request(4200)).await.unwrap();
        let report = manager.sync_all().await;
        assert_eq!(report.failed, 1);

        let parked = manager.get(payment.id).await.unwrap();
        assert_eq!(parked.status, PaymentStatus::Failed);
        let conflict_id = parked.pending_conflict.unwrap();
        assert_eq!(harness.conflicts.pending_manual().await.len(), 1);

        let resolved = manager
            .resolve_conflict(conflict_id, Resolution::KeepLocal)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, PaymentStatus::Synced);
        assert_eq!(resolved.remote_ref.as_deref(), Some("pay_local"));
        assert!(resolved.pending_conflict.is_none());
        assert!(gateway.submitted()[1].conflict_override);
        assert!(harness.conflicts.pending_manual().await.is_empty());
    }

    #[tokio::test]
    async fn test_manual_conflict_keep_remote() {
        let harness = Harness::new(true).await;
        let gateway = Arc::new(Scripted::default().then(remote_conflict()));
        let manager = harness
            .manager(gateway.clone(), ConflictPolicy::Manual)
            .await;

        let payment = manager.queue_payment(request(4200)).await.unwrap();
        manager.sync_all().await;
        let conflict_id = manager
            .get(payment.id)
            .await
            .unwrap()
            .pending_conflict
            .unwrap();

        let resolved = manager
            .resolve_conflict(conflict_id, Resolution::KeepRemote)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, PaymentStatus::Synced);
        assert_eq!(resolved.remote_ref.as_deref(), Some("pay_remote"));
        assert_eq!(gateway.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_analytics_reflect_queue() {
        let harness = Harness::new(false).await;
        let manager = harness
            .manager(Arc::new(Scripted::default()), ConflictPolicy::default())
            .await;
        manager.queue_payment(request(100)).await.unwrap();
        manager.queue_payment(request(250)).await.unwrap();

        let analytics = manager.analytics().await;
        assert_eq!(analytics.total, 2);
        assert_eq!(analytics.unsynced_by_currency["USD"], 350);
    }
}
