//! Conflict commands.

use serde_json::Value;

use crate::cli::args::{ConflictCommands, Decision, OutputFormat};
use crate::error::LedgerError;
use crate::features::conflict::Resolution;
use crate::output::{format_conflict_outcome, format_conflicts, to_json};
use crate::service::SyncService;

/// Execute conflict subcommands.
///
/// # Errors
///
/// Returns `InvalidPayload` for a merge without valid `--data`, and the
/// service's error for unknown or settled conflicts.
pub async fn conflicts(
    service: &SyncService,
    cmd: ConflictCommands,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    match cmd {
        ConflictCommands::List { pending } => {
            let conflicts = if pending {
                service.conflicts().pending_manual().await
            } else {
                service.conflicts().list().await
            };
            format_conflicts(&conflicts, format)
        }
        ConflictCommands::Resolve { id, decision, data } => {
            let resolution = to_resolution(decision, data.as_deref())?;
            let outcome = service.resolve_conflict(id, resolution).await?;
            format_conflict_outcome(&outcome, format)
        }
        ConflictCommands::Purge { older_than_days } => {
            let purged = service
                .conflicts()
                .purge_resolved(chrono::Duration::days(older_than_days))
                .await;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({ "purged": purged })),
                OutputFormat::Pretty => Ok(format!(
                    "Purged {purged} conflicts settled more than {older_than_days} days ago"
                )),
            }
        }
    }
}

fn to_resolution(decision: Decision, data: Option<&str>) -> Result<Resolution, LedgerError> {
    match decision {
        Decision::KeepLocal => Ok(Resolution::KeepLocal),
        Decision::KeepRemote => Ok(Resolution::KeepRemote),
        Decision::Merge => {
            let raw = data.ok_or_else(|| {
                LedgerError::InvalidPayload("merge needs --data with the merged record".to_string())
            })?;
            let merged: Value = serde_json::from_str(raw)
                .map_err(|e| LedgerError::InvalidPayload(format!("--data is not valid JSON: {e}")))?;
            Ok(Resolution::Merge(merged))
        }
    }
}
