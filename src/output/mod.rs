//! Output formatting for offline-ledger.
//!
//! This module renders queue, payment, and conflict data as coloured text
//! or JSON.

mod json;
mod pretty;

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::LedgerError;
use crate::features::conflict::SyncConflict;
use crate::features::payments::{OfflinePayment, PaymentAnalytics, SyncReport};
use crate::features::sync::{DeadLetter, DrainReport, QueueItem};
use crate::service::{ConflictOutcome, LedgerStatus, SyncPass};

pub use json::*;
pub use pretty::*;

fn render<T: Serialize>(
    value: &T,
    format: OutputFormat,
    pretty: impl FnOnce(&T) -> String,
) -> Result<String, LedgerError> {
    match format {
        OutputFormat::Pretty => Ok(pretty(value)),
        OutputFormat::Json => to_json(value),
    }
}

/// Format the combined status view.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_status(status: &LedgerStatus, format: OutputFormat) -> Result<String, LedgerError> {
    render(status, format, format_status_pretty)
}

/// Format pending mutations.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_queue(items: &[QueueItem], format: OutputFormat) -> Result<String, LedgerError> {
    match format {
        OutputFormat::Pretty => Ok(format_queue_pretty(items)),
        OutputFormat::Json => format_list_json("queue", items),
    }
}

/// Format dead-lettered mutations.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_dead_letters(
    letters: &[DeadLetter],
    format: OutputFormat,
) -> Result<String, LedgerError> {
    match format {
        OutputFormat::Pretty => Ok(format_dead_letters_pretty(letters)),
        OutputFormat::Json => format_list_json("dead_letters", letters),
    }
}

/// Format a drain report.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_drain(report: &DrainReport, format: OutputFormat) -> Result<String, LedgerError> {
    render(report, format, format_drain_pretty)
}

/// Format a combined sync pass.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_sync_pass(pass: &SyncPass, format: OutputFormat) -> Result<String, LedgerError> {
    render(pass, format, |pass| {
        format!(
            "{}\n{}",
            format_drain_pretty(&pass.mutations),
            format_sync_report_pretty(&pass.payments)
        )
    })
}

/// Format one payment.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_payment(payment: &OfflinePayment, format: OutputFormat) -> Result<String, LedgerError> {
    render(payment, format, format_payment_pretty)
}

/// Format a list of payments.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_payments(
    payments: &[OfflinePayment],
    format: OutputFormat,
) -> Result<String, LedgerError> {
    match format {
        OutputFormat::Pretty => Ok(format_payments_pretty(payments)),
        OutputFormat::Json => format_list_json("payments", payments),
    }
}

/// Format a payment sync report.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_sync_report(report: &SyncReport, format: OutputFormat) -> Result<String, LedgerError> {
    render(report, format, format_sync_report_pretty)
}

/// Format payment analytics.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_analytics(
    analytics: &PaymentAnalytics,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    render(analytics, format, format_analytics_pretty)
}

/// Format the conflict log.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_conflicts(
    conflicts: &[SyncConflict],
    format: OutputFormat,
) -> Result<String, LedgerError> {
    match format {
        OutputFormat::Pretty => Ok(format_conflicts_pretty(conflicts)),
        OutputFormat::Json => format_list_json("conflicts", conflicts),
    }
}

/// Format the effect of a manual conflict decision.
///
/// # Errors
///
/// Returns `LedgerError::Serialization` if JSON serialization fails.
pub fn format_conflict_outcome(
    outcome: &ConflictOutcome,
    format: OutputFormat,
) -> Result<String, LedgerError> {
    render(outcome, format, format_conflict_outcome_pretty)
}
