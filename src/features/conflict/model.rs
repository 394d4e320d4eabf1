//! Conflict data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// How detected conflicts are settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Newest wall-clock write wins; disjoint field edits are merged.
    ///
    /// This can silently discard a legitimate concurrent edit when both
    /// sides touched the same field. Integrators needing stronger
    /// guarantees should pick `Manual`.
    #[default]
    LatestWrite,
    /// The system of record always wins.
    ServerWins,
    /// The device's edit always wins.
    ClientWins,
    /// Field-level merge wherever both sides are objects.
    Merge,
    /// Every conflict waits for a user decision.
    Manual,
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LatestWrite => "latest_write",
            Self::ServerWins => "server_wins",
            Self::ClientWins => "client_wins",
            Self::Merge => "merge",
            Self::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

/// Shape of a divergence between local and remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Local write is newer than the remote record.
    LocalNewer,
    /// Remote record is newer than (or as new as) the local write.
    RemoteNewer,
    /// Both sides changed, but different fields.
    BothChangedDifferentFields,
    /// One side deleted the entity, the other updated it.
    DeleteVsUpdate,
}

/// Decision recorded for a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "data", rename_all = "snake_case")]
pub enum Resolution {
    /// Push the local version over the remote one.
    KeepLocal,
    /// Accept the remote record and drop the local change.
    KeepRemote,
    /// Push this merged version.
    Merge(Value),
    /// Park until a user decides.
    Manual,
}

impl Resolution {
    /// Short label for display.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::Merge(_) => "merge",
            Self::Manual => "manual",
        }
    }
}

/// Kind of entity a conflict is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Transaction,
    Invoice,
    Payment,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transaction => write!(f, "transaction"),
            Self::Invoice => write!(f, "invoice"),
            Self::Payment => write!(f, "payment"),
        }
    }
}

/// What the conflict refers to on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSubject {
    /// Entity type.
    pub entity: EntityKind,
    /// Remote identifier, when the entity already exists remotely.
    pub entity_id: Option<String>,
    /// Id of the local queue item or payment.
    pub local_ref: String,
}

/// One side's view of the entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity fields.
    #[serde(default)]
    pub data: Value,
    /// Wall-clock time of the write that produced this view.
    #[serde(default, alias = "updated_at", alias = "updatedAt")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Fields touched by that write; `None` when unknown.
    #[serde(default, alias = "changedFields")]
    pub changed_fields: Option<Vec<String>>,
    /// Whether this side deleted the entity.
    #[serde(default)]
    pub deleted: bool,
}

/// A detected divergence and the decision taken for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: Uuid,
    pub subject: ConflictSubject,
    pub local: EntitySnapshot,
    pub remote: EntitySnapshot,
    pub kind: ConflictKind,
    pub policy: ConflictPolicy,
    pub resolution: Resolution,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: DateTime<Utc>,
}

impl SyncConflict {
    /// Whether the conflict still waits on a user decision.
    #[must_use]
    pub fn awaiting_user(&self) -> bool {
        self.resolution == Resolution::Manual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_yaml_name() {
        let policy: ConflictPolicy = serde_yaml::from_str("server_wins").unwrap();
        assert_eq!(policy, ConflictPolicy::ServerWins);
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::LatestWrite);
    }

    #[test]
    fn test_resolution_serialized_shape() {
        let json = serde_json::to_value(Resolution::Merge(serde_json::json!({"a": 1}))).unwrap();
        assert_eq!(json["decision"], "merge");
        assert_eq!(json["data"]["a"], 1);

        let json = serde_json::to_value(Resolution::KeepRemote).unwrap();
        assert_eq!(json["decision"], "keep_remote");
    }

    #[test]
    fn test_snapshot_defaults_when_fields_missing() {
        let snapshot: EntitySnapshot = serde_json::from_str(r#"{"data": {"amount": 5}}"#).unwrap();
        assert!(snapshot.modified_at.is_none());
        assert!(snapshot.changed_fields.is_none());
        assert!(!snapshot.deleted);
    }
}
