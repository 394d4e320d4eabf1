//! Deterministic conflict classification and resolution.

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::model::{
    ConflictKind, ConflictPolicy, ConflictSubject, EntitySnapshot, Resolution, SyncConflict,
};

/// Applies a [`ConflictPolicy`] to detected conflicts.
///
/// For identical inputs and policy, `decide` always returns the same
/// resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ConflictPolicy,
}

impl ConflictResolver {
    #[must_use]
    pub const fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Classify how `local` and `remote` diverge.
    #[must_use]
    pub fn classify(local: &EntitySnapshot, remote: &EntitySnapshot) -> ConflictKind {
        if local.deleted != remote.deleted {
            return ConflictKind::DeleteVsUpdate;
        }

        if let (Some(ours), Some(theirs)) = (&local.changed_fields, &remote.changed_fields) {
            if !ours.is_empty()
                && !theirs.is_empty()
                && ours.iter().all(|field| !theirs.contains(field))
            {
                return ConflictKind::BothChangedDifferentFields;
            }
        }

        // Ties go to the system of record
        match (local.modified_at, remote.modified_at) {
            (Some(ours), Some(theirs)) if ours > theirs => ConflictKind::LocalNewer,
            (Some(_), None) => ConflictKind::LocalNewer,
            _ => ConflictKind::RemoteNewer,
        }
    }

    /// Pick a resolution for a classified conflict.
    #[must_use]
    pub fn decide(
        &self,
        kind: ConflictKind,
        local: &EntitySnapshot,
        remote: &EntitySnapshot,
    ) -> Resolution {
        match self.policy {
            ConflictPolicy::ServerWins => Resolution::KeepRemote,
            ConflictPolicy::ClientWins => Resolution::KeepLocal,
            ConflictPolicy::Manual => Resolution::Manual,
            ConflictPolicy::LatestWrite => match kind {
                ConflictKind::LocalNewer => Resolution::KeepLocal,
                ConflictKind::RemoteNewer => Resolution::KeepRemote,
                ConflictKind::BothChangedDifferentFields => {
                    merge(local, remote).map_or(Resolution::Manual, Resolution::Merge)
                }
                ConflictKind::DeleteVsUpdate => Resolution::Manual,
            },
            ConflictPolicy::Merge => match kind {
                ConflictKind::DeleteVsUpdate => Resolution::Manual,
                _ => merge(local, remote).map_or(Resolution::Manual, Resolution::Merge),
            },
        }
    }

    /// Classify, decide, and stamp a conflict record.
    #[must_use]
    pub fn resolve(
        &self,
        subject: ConflictSubject,
        local: EntitySnapshot,
        remote: EntitySnapshot,
    ) -> SyncConflict {
        let kind = Self::classify(&local, &remote);
        let resolution = self.decide(kind, &local, &remote);
        let now = Utc::now();

        tracing::info!(
            entity = %subject.entity,
            local_ref = %subject.local_ref,
            ?kind,
            decision = resolution.label(),
            "conflict resolved"
        );

        SyncConflict {
            id: Uuid::now_v7(),
            subject,
            local,
            remote,
            kind,
            policy: self.policy,
            resolution,
            detected_at: now,
            resolved_at: now,
        }
    }
}

/// Overlay the local edit onto the remote record.
///
/// Only the fields the local write changed are copied when those are known;
/// otherwise every local field wins. Returns `None` unless both sides are
/// JSON objects.
fn merge(local: &EntitySnapshot, remote: &EntitySnapshot) -> Option<Value> {
    let (Value::Object(ours), Value::Object(theirs)) = (&local.data, &remote.data) else {
        return None;
    };

    let mut merged: Map<String, Value> = theirs.clone();
    match &local.changed_fields {
        Some(fields) => {
            for field in fields {
                if let Some(value) = ours.get(field) {
                    merged.insert(field.clone(), value.clone());
                }
            }
        }
        None => {
            for (field, value) in ours {
                merged.insert(field.clone(), value.clone());
            }
        }
    }
    Some(Value::Object(merged))
}
