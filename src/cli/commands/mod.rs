//! Command implementations for offline-ledger.
//!
//! Every command returns the text to print; `main` does the printing.

mod conflicts;
mod payment;
mod queue;

pub use conflicts::conflicts;
pub use payment::payment;
pub use queue::{dead_letter, queue};

use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::Shell;
use serde_json::Value;

use crate::cli::args::{Cli, EnqueueArgs, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::LedgerError;
use crate::features::sync::MutationPayload;
use crate::network::NetworkStateMonitor;
use crate::output::{format_drain, format_status, format_sync_pass, to_json};
use crate::service::SyncService;
use crate::storage::{Database, SqliteKvStore};

/// Open the durable store and build the service for one CLI invocation.
///
/// The device is treated as online unless `offline` is set.
///
/// # Errors
///
/// Returns an error if the data directory or database cannot be opened.
pub async fn open_service(
    paths: &Paths,
    config: &Config,
    offline: bool,
) -> Result<SyncService, LedgerError> {
    paths.ensure_dirs()?;
    let db = Database::open_at(&paths.database)?;
    let kv = Arc::new(SqliteKvStore::new(db));
    let monitor = Arc::new(NetworkStateMonitor::new(Some(!offline)));
    SyncService::open(config, kv, monitor).await
}

/// Execute status command
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub async fn status(service: &SyncService, format: OutputFormat) -> Result<String, LedgerError> {
    format_status(&service.status().await, format)
}

/// Execute enqueue command
///
/// # Errors
///
/// Returns `InvalidPayload` for malformed JSON or a missing entity id.
pub async fn enqueue(
    service: &SyncService,
    args: EnqueueArgs,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    let data: Value = serde_json::from_str(&args.data)
        .map_err(|e| LedgerError::InvalidPayload(format!("--data is not valid JSON: {e}")))?;
    if args.action.requires_entity_id() && args.entity_id.is_none() {
        return Err(LedgerError::InvalidPayload(format!(
            "{} needs --entity-id",
            args.action.display_name()
        )));
    }

    let mut payload = MutationPayload::new(data);
    if let Some(entity_id) = args.entity_id {
        payload = payload.with_entity_id(entity_id);
    }
    if let Some(token) = args.auth_token {
        payload = payload.with_auth_token(token);
    }

    let item = service.queue().enqueue(args.action, payload).await;
    let status = service.queue().get_status().await;
    let still_queued = status.queue.iter().any(|queued| queued.id == item.id);

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "item": item,
            "queued": still_queued,
            "queue_length": status.queue_length,
        })),
        OutputFormat::Pretty => Ok(if still_queued {
            format!(
                "Queued {} {} ({} pending)",
                item.action.display_name(),
                item.id,
                status.queue_length
            )
        } else {
            format!("Sent {} {}", item.action.display_name(), item.id)
        }),
    }
}

/// Execute drain command
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub async fn drain(
    service: &SyncService,
    force: bool,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    let report = if force {
        service.queue().force_drain().await
    } else {
        service.queue().drain().await
    };
    format_drain(&report, format)
}

/// Execute sync command
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub async fn sync(service: &SyncService, format: OutputFormat) -> Result<String, LedgerError> {
    format_sync_pass(&service.sync_now().await, format)
}

/// Generate shell completions for the specified shell.
#[must_use]
pub fn completions(shell: Shell) -> String {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "offline-ledger", &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
