//! Outbound dispatch of queued mutations.
//!
//! A dispatcher performs exactly one remote call per item and reports a
//! structured outcome. It knows nothing about retries or queues.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::item::{MutationAction, QueueItem};
use crate::features::conflict::EntitySnapshot;
use crate::remote::{CallOptions, Endpoint, RemoteClient, RemoteReply};

/// Why a dispatch attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response from the server.
    Transport,
    /// Non-2xx, non-409 response.
    Status(u16),
    /// The attempt ran past the dispatch timeout.
    Timeout,
    /// Connectivity dropped while the call was in flight.
    Cancelled,
    /// The item can't be addressed (e.g. update without an id).
    InvalidPayload,
}

/// Structured failure returned instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl DispatchFailure {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success,
    Failure(DispatchFailure),
    /// Remote state diverged; carries the server's view.
    Conflict(EntitySnapshot),
}

/// Performs the remote call for one queued mutation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Execute `item` against its endpoint.
    async fn dispatch(&self, item: &QueueItem) -> DispatchOutcome;
}

/// Dispatcher backed by the HTTP remote API.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: RemoteClient,
}

impl HttpDispatcher {
    #[must_use]
    pub const fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

/// Map an item to the endpoint its action targets.
///
/// # Errors
///
/// Returns an `InvalidPayload` failure when an update or delete has no
/// entity id.
pub fn endpoint_for(item: &QueueItem) -> Result<Endpoint, DispatchFailure> {
    let id = || {
        item.payload.entity_id.clone().ok_or_else(|| {
            DispatchFailure::new(
                FailureKind::InvalidPayload,
                format!("{} needs an entity id", item.action),
            )
        })
    };

    Ok(match item.action {
        MutationAction::CreateTransaction => Endpoint::CreateTransaction,
        MutationAction::UpdateTransaction => Endpoint::UpdateTransaction(id()?),
        MutationAction::DeleteTransaction => Endpoint::DeleteTransaction(id()?),
        MutationAction::CreateInvoice => Endpoint::CreateInvoice,
        MutationAction::UpdateInvoice => Endpoint::UpdateInvoice(id()?),
    })
}

#[async_trait]
impl ActionDispatcher for HttpDispatcher {
    async fn dispatch(&self, item: &QueueItem) -> DispatchOutcome {
        let endpoint = match endpoint_for(item) {
            Ok(endpoint) => endpoint,
            Err(failure) => return DispatchOutcome::Failure(failure),
        };

        let body = (!item.action.is_delete()).then_some(&item.payload.data);
        let options = CallOptions {
            api_key: item.payload.auth_token.as_deref(),
            body,
            conflict_override: item.conflict_override,
        };

        match self.client.call(&endpoint, options).await {
            Ok(RemoteReply::Accepted(_)) => DispatchOutcome::Success,
            Ok(RemoteReply::Conflict(remote)) => DispatchOutcome::Conflict(remote),
            Ok(RemoteReply::Rejected { status, message }) => {
                DispatchOutcome::Failure(DispatchFailure::new(FailureKind::Status(status), message))
            }
            Err(e) => {
                DispatchOutcome::Failure(DispatchFailure::new(FailureKind::Transport, e.to_string()))
            }
        }
    }
}

/// Run one dispatch bounded by `timeout` and, when given, aborted by `cancel`.
///
/// A timed-out or cancelled attempt comes back as an ordinary failure.
pub async fn dispatch_guarded(
    dispatcher: &dyn ActionDispatcher,
    item: &QueueItem,
    timeout: Duration,
    cancel: Option<CancellationToken>,
) -> DispatchOutcome {
    let attempt = async {
        tokio::time::timeout(timeout, dispatcher.dispatch(item))
            .await
            .unwrap_or_else(|_| {
                DispatchOutcome::Failure(DispatchFailure::new(
                    FailureKind::Timeout,
                    format!("no response within {}s", timeout.as_secs()),
                ))
            })
    };

    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => DispatchOutcome::Failure(DispatchFailure::new(
                FailureKind::Cancelled,
                "connectivity lost during dispatch",
            )),
            outcome = attempt => outcome,
        },
        None => attempt.await,
    }
}
