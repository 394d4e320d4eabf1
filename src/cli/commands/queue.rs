//! Mutation queue and dead-letter commands.

use colored::Colorize;

use crate::cli::args::{DeadLetterCommands, OutputFormat, QueueCommands};
use crate::error::LedgerError;
use crate::output::{format_dead_letters, format_queue, to_json};
use crate::service::SyncService;

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if `clear` is not confirmed or the store fails.
pub async fn queue(
    service: &SyncService,
    cmd: QueueCommands,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    match cmd {
        QueueCommands::List { entity } => {
            let items = match entity {
                Some(entity_id) => service.queue().items_for_entity(&entity_id).await,
                None => service.queue().get_status().await.queue,
            };
            format_queue(&items, format)
        }
        QueueCommands::Clear { force } => {
            if !force {
                return Err(LedgerError::Config(
                    "Use --force to clear the mutation queue".to_string(),
                ));
            }
            let cleared = service.queue().clear().await?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({ "cleared": cleared })),
                OutputFormat::Pretty => Ok(format!("Cleared {cleared} pending mutations")),
            }
        }
    }
}

/// Execute dead-letter subcommands.
///
/// # Errors
///
/// Returns `NotFound` for an unknown item id.
pub async fn dead_letter(
    service: &SyncService,
    cmd: DeadLetterCommands,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    match cmd {
        DeadLetterCommands::List => format_dead_letters(&service.queue().dead_letters().await, format),
        DeadLetterCommands::Requeue { id } => {
            let item = service.queue().requeue_dead_letter(id).await?;
            match format {
                OutputFormat::Json => to_json(&item),
                OutputFormat::Pretty => Ok(format!(
                    "{} Requeued {} {}",
                    "✓".green(),
                    item.action.display_name(),
                    item.id
                )),
            }
        }
        DeadLetterCommands::Discard { id } => {
            let letter = service.queue().discard_dead_letter(id).await?;
            match format {
                OutputFormat::Json => to_json(&letter),
                OutputFormat::Pretty => Ok(format!(
                    "{} Discarded {} {}",
                    "✗".red(),
                    letter.item.action.display_name(),
                    letter.item.id
                )),
            }
        }
    }
}
