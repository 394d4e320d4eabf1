//! Dead-letter handling for mutations that left the live queue unsent.
//!
//! Items land here when they reach the retry ceiling or when a conflict on
//! them needs a user decision. Nothing here is retried automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::QueueItem;
use super::queue::{MutationQueueManager, QueueEvent};
use crate::error::LedgerError;
use crate::features::conflict::Resolution;

/// Why an item was dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Reached `max_retries` failed attempts.
    RetriesExhausted,
    /// Parked until the user settles the named conflict.
    AwaitingConflictDecision { conflict_id: Uuid },
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted => write!(f, "retries exhausted"),
            Self::AwaitingConflictDecision { conflict_id } => {
                write!(f, "awaiting decision on conflict {conflict_id}")
            }
        }
    }
}

/// A mutation held for manual retry or discard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub item: QueueItem,
    pub reason: DeadLetterReason,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    #[must_use]
    pub fn new(item: QueueItem, reason: DeadLetterReason) -> Self {
        Self {
            item,
            reason,
            dead_lettered_at: Utc::now(),
        }
    }
}

impl MutationQueueManager {
    /// All dead-lettered items, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead.clone()
    }

    /// Put a dead-lettered item back at the end of the live queue with a
    /// fresh retry budget.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no dead letter has this id.
    pub async fn requeue_dead_letter(&self, id: Uuid) -> Result<QueueItem, LedgerError> {
        let item = {
            let mut state = self.state.lock().await;
            let letter = take_letter(&mut state.dead, id)?;

            let mut item = letter.item;
            item.retry_count = 0;
            item.last_error = None;
            state.live.push(item.clone());
            self.persist_all(&mut state).await;
            item
        };

        tracing::info!(item = %id, "dead letter requeued");
        self.emit(QueueEvent::Enqueued { id });
        self.drain_if_online().await;
        Ok(item)
    }

    /// Drop a dead-lettered item for good.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no dead letter has this id.
    pub async fn discard_dead_letter(&self, id: Uuid) -> Result<DeadLetter, LedgerError> {
        let mut state = self.state.lock().await;
        let letter = take_letter(&mut state.dead, id)?;
        self.persist_dead(&mut state).await;

        tracing::info!(item = %id, action = %letter.item.action, "dead letter discarded");
        Ok(letter)
    }

    /// Apply a user's decision to an item parked on a conflict.
    ///
    /// `KeepRemote` drops the item; `KeepLocal` and `Merge` requeue it with
    /// the conflict override flag set.
    ///
    /// # Errors
    ///
    /// Returns the conflict log's error for unknown or already-settled
    /// conflicts, and `InvalidPayload` for a `Manual` decision.
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        decision: Resolution,
    ) -> Result<Option<QueueItem>, LedgerError> {
        let conflict = self.conflicts.resolve_manually(conflict_id, decision).await?;
        self.emit(QueueEvent::ConflictResolved {
            conflict_id,
            decision: conflict.resolution.label().to_string(),
        });

        let requeued = {
            let mut state = self.state.lock().await;
            let position = state.dead.iter().position(|letter| {
                letter.reason == DeadLetterReason::AwaitingConflictDecision { conflict_id }
            });
            let Some(position) = position else {
                return Ok(None);
            };
            let letter = state.dead.remove(position);

            let requeued = match conflict.resolution {
                Resolution::KeepRemote | Resolution::Manual => None,
                Resolution::KeepLocal => Some(letter.item),
                Resolution::Merge(data) => {
                    let mut item = letter.item;
                    item.payload.data = data;
                    Some(item)
                }
            }
            .map(|mut item| {
                item.conflict_override = true;
                item.retry_count = 0;
                item
            });

            if let Some(item) = &requeued {
                state.live.push(item.clone());
            }
            self.persist_all(&mut state).await;
            requeued
        };

        if requeued.is_some() {
            self.drain_if_online().await;
        }
        Ok(requeued)
    }
}

fn take_letter(dead: &mut Vec<DeadLetter>, id: Uuid) -> Result<DeadLetter, LedgerError> {
    let position = dead
        .iter()
        .position(|letter| letter.item.id == id)
        .ok_or_else(|| LedgerError::NotFound(format!("dead letter {id}")))?;
    Ok(dead.remove(position))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serialized_shape() {
        let id = Uuid::now_v7();
        let json =
            serde_json::to_value(DeadLetterReason::AwaitingConflictDecision { conflict_id: id })
                .unwrap();
        assert_eq!(json["reason"], "awaiting_conflict_decision");
        assert_eq!(json["conflict_id"], id.to_string());
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(DeadLetterReason::RetriesExhausted.to_string(), "retries exhausted");
    }
}
