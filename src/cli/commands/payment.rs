//! Payment commands.

use colored::Colorize;

use crate::cli::args::{OutputFormat, PaymentCommands};
use crate::error::LedgerError;
use crate::features::payments::{format_minor, CaptureData, PaymentRequest};
use crate::output::{
    format_analytics, format_payment, format_payments, format_sync_report, to_json,
};
use crate::service::SyncService;

/// Execute payment subcommands.
///
/// # Errors
///
/// Returns the payment manager's error (validation, `NotFound`,
/// `PaymentTerminal`, `RetryExhausted`, ...) or a formatting error.
pub async fn payment(
    service: &SyncService,
    cmd: PaymentCommands,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    let payments = service.payments();

    match cmd {
        PaymentCommands::Queue {
            amount,
            currency,
            recipient,
            description,
            method,
        } => {
            let payment = payments
                .queue_payment(PaymentRequest {
                    amount,
                    currency,
                    recipient,
                    description,
                    method,
                })
                .await?;
            format_payment(&payment, format)
        }
        PaymentCommands::Capture {
            id,
            amount,
            method,
            evidence,
        } => {
            let capture = payments
                .capture_offline(
                    id,
                    CaptureData {
                        amount,
                        method,
                        evidence,
                    },
                )
                .await?;
            match format {
                OutputFormat::Json => to_json(&capture),
                OutputFormat::Pretty => Ok(format!(
                    "{} Captured {} via {}",
                    "✓".green(),
                    format_minor(capture.amount),
                    capture.method
                )),
            }
        }
        PaymentCommands::Sync => format_sync_report(&payments.sync_all().await, format),
        PaymentCommands::Retry { id } => format_payment(&payments.retry(id).await?, format),
        PaymentCommands::Cancel { id, reason } => {
            format_payment(&payments.cancel(id, reason).await?, format)
        }
        PaymentCommands::List { status } => format_payments(&payments.list(status).await, format),
        PaymentCommands::Show { id } => format_payment(&payments.get(id).await?, format),
        PaymentCommands::Analytics => format_analytics(&payments.analytics().await, format),
        PaymentCommands::Purge { older_than_days } => {
            let purged = payments
                .purge_terminal(chrono::Duration::days(older_than_days))
                .await;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({ "purged": purged })),
                OutputFormat::Pretty => Ok(format!(
                    "Purged {purged} payments finished more than {older_than_days} days ago"
                )),
            }
        }
    }
}
