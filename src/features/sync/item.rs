//! Queued mutation records.
//!
//! Defines the closed set of mutation actions and the item that carries one
//! through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::features::conflict::{EntityKind, EntitySnapshot};

/// Mutation kinds the queue can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationAction {
    /// Create a transaction
    CreateTransaction,
    /// Update a transaction
    UpdateTransaction,
    /// Delete a transaction
    DeleteTransaction,
    /// Create an invoice
    CreateInvoice,
    /// Update an invoice
    UpdateInvoice,
}

impl MutationAction {
    /// Get the display name for this action.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::CreateTransaction => "Create Transaction",
            Self::UpdateTransaction => "Update Transaction",
            Self::DeleteTransaction => "Delete Transaction",
            Self::CreateInvoice => "Create Invoice",
            Self::UpdateInvoice => "Update Invoice",
        }
    }

    /// Entity type this action writes.
    #[must_use]
    pub const fn entity(&self) -> EntityKind {
        match self {
            Self::CreateTransaction | Self::UpdateTransaction | Self::DeleteTransaction => {
                EntityKind::Transaction
            }
            Self::CreateInvoice | Self::UpdateInvoice => EntityKind::Invoice,
        }
    }

    /// Whether the action addresses an existing remote resource.
    #[must_use]
    pub const fn requires_entity_id(&self) -> bool {
        !matches!(self, Self::CreateTransaction | Self::CreateInvoice)
    }

    #[must_use]
    pub const fn is_update(&self) -> bool {
        matches!(self, Self::UpdateTransaction | Self::UpdateInvoice)
    }

    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::DeleteTransaction)
    }
}

impl std::fmt::Display for MutationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Entity data plus what is needed to address and authorize the call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MutationPayload {
    /// Remote id of the entity, required for updates and deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Auth token sent with the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Entity fields.
    #[serde(default)]
    pub data: Value,
}

impl MutationPayload {
    /// Payload with entity data only.
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// One pending mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Time-ordered id; sorts in enqueue order.
    pub id: Uuid,
    pub action: MutationAction,
    pub payload: MutationPayload,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Send with the conflict override flag after a conflict decision.
    #[serde(default)]
    pub conflict_override: bool,
}

impl QueueItem {
    /// Create a fresh item with `retry_count = 0`.
    #[must_use]
    pub fn new(action: MutationAction, payload: MutationPayload, max_retries: u32) -> Self {
        Self {
            id: Uuid::now_v7(),
            action,
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            max_retries,
            last_error: None,
            last_attempt_at: None,
            conflict_override: false,
        }
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(Utc::now());
    }

    /// Whether the item may go back to the live queue.
    #[must_use]
    pub const fn within_ceiling(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// The local side of a conflict on this item.
    #[must_use]
    pub fn local_snapshot(&self) -> EntitySnapshot {
        let changed_fields = if self.action.is_update() {
            self.payload
                .data
                .as_object()
                .map(|fields| fields.keys().cloned().collect())
        } else {
            None
        };

        EntitySnapshot {
            data: self.payload.data.clone(),
            modified_at: Some(self.enqueued_at),
            changed_fields,
            deleted: self.action.is_delete(),
        }
    }
}
