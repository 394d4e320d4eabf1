//! Error types for offline-ledger.

use thiserror::Error;

use crate::features::payments::PaymentStatus;

/// Errors surfaced by the queue managers, storage, and CLI.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// SQLite or key-value storage failure.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration could not be read, parsed, or written.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network or HTTP failure talking to the remote API.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A durable write failed; in-memory state is still authoritative.
    #[error("storage degraded: {0}")]
    StorageDegraded(String),

    /// A payment retry was requested after the retry budget was used up.
    #[error("payment {payment_id} exhausted its retries ({retry_count}/{max_retries})")]
    RetryExhausted {
        payment_id: String,
        retry_count: u32,
        max_retries: u32,
    },

    /// The payment is `synced` or `cancelled` and cannot be changed.
    #[error("payment {payment_id} is already {status}")]
    PaymentTerminal {
        payment_id: String,
        status: PaymentStatus,
    },

    /// A payment status change not allowed by the lifecycle.
    #[error("invalid payment transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// A remote call for this record is already running.
    #[error("sync already in progress: {0}")]
    SyncInProgress(String),

    /// The queued payload is missing data the action needs.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Remote state diverged from the local expectation and needs a decision.
    #[error("conflict detected: {0}")]
    ConflictDetected(String),

    /// Requested item does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl LedgerError {
    /// Whether this error is the kind a user is expected to act on.
    #[must_use]
    pub const fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::RetryExhausted { .. }
                | Self::PaymentTerminal { .. }
                | Self::ConflictDetected(_)
                | Self::InvalidPayload(_)
        )
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
