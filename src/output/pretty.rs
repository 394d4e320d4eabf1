use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::features::conflict::SyncConflict;
use crate::features::payments::{format_minor, OfflinePayment, PaymentAnalytics, PaymentStatus, SyncReport};
use crate::features::sync::{DeadLetter, DrainReport, QueueItem};
use crate::service::{ConflictOutcome, LedgerStatus};

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

fn age(since: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(since);
    if age.num_days() > 0 {
        format!("{}d ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

/// Format the combined status view.
pub fn format_status_pretty(status: &LedgerStatus) -> String {
    let queue = &status.queue;
    let mut lines = vec!["Offline Ledger Status".bold().to_string(), "─".repeat(40)];

    let connectivity = if queue.is_online {
        "online".green()
    } else {
        "offline".yellow()
    };
    lines.push(format!("  Network:       {connectivity}"));
    lines.push(format!(
        "  Queued:        {} {}",
        queue.queue_length,
        if queue.is_draining {
            "draining".cyan()
        } else {
            "mutations".dimmed()
        }
    ));
    lines.push(format!(
        "  Dead letters:  {} {}",
        queue.dead_letter_count,
        if queue.dead_letter_count > 0 {
            "need attention".red()
        } else {
            "".normal()
        }
    ));

    let unsynced: usize = status
        .payments
        .by_status
        .iter()
        .filter(|(status, _)| *status != "synced" && *status != "cancelled")
        .map(|(_, count)| count)
        .sum();
    lines.push(format!("  Payments:      {unsynced} {}", "unsynced".dimmed()));
    lines.push(format!(
        "  Conflicts:     {} {}",
        status.pending_conflicts,
        if status.pending_conflicts > 0 {
            "awaiting decision".red()
        } else {
            "".normal()
        }
    ));

    if let Some(at) = queue.last_drain_at {
        lines.push(format!("  Last drain:    {}", age(at).dimmed()));
    }
    if queue.durability_degraded {
        lines.push(String::new());
        lines.push(
            "⚠ Durable storage is failing; changes are held in memory only"
                .yellow()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format the pending mutation queue.
pub fn format_queue_pretty(items: &[QueueItem]) -> String {
    if items.is_empty() {
        return "Mutation Queue (0 items)\n  Nothing pending".to_string();
    }

    let mut output = format!("Mutation Queue ({} items)\n", items.len());
    output.push_str(&rule());
    output.push('\n');

    for item in items {
        let icon = if item.retry_count == 0 {
            "○".white()
        } else {
            "↻".yellow()
        };
        let mut line = format!(
            "{} {}  {}",
            icon,
            short_id(&item.id).dimmed(),
            item.action.display_name().bold()
        );
        if let Some(entity_id) = &item.payload.entity_id {
            let _ = write!(line, "  {}", entity_id.cyan());
        }
        let _ = write!(
            line,
            "  {}",
            format!("{}/{}", item.retry_count, item.max_retries).dimmed()
        );
        if let Some(error) = &item.last_error {
            let _ = write!(line, "  {}", error.red());
        }
        output.push_str(&line);
        output.push('\n');
    }

    output
}

/// Format dead-lettered mutations.
pub fn format_dead_letters_pretty(letters: &[DeadLetter]) -> String {
    if letters.is_empty() {
        return "Dead Letters (0)\n  Nothing needs attention".to_string();
    }

    let mut output = format!("Dead Letters ({})\n", letters.len());
    output.push_str(&rule());
    output.push('\n');

    for letter in letters {
        let _ = writeln!(
            output,
            "{} {}  {}  {}",
            "✗".red(),
            letter.item.id.to_string().dimmed(),
            letter.item.action.display_name().bold(),
            age(letter.dead_lettered_at).dimmed()
        );
        let _ = writeln!(output, "    {}", letter.reason.to_string().yellow());
        if let Some(error) = &letter.item.last_error {
            let _ = writeln!(output, "    {}", error.red());
        }
    }

    output
}

/// Format the result of a mutation drain.
pub fn format_drain_pretty(report: &DrainReport) -> String {
    if report.skipped {
        return format!("{} A drain is already running", "○".dimmed());
    }
    if report.attempted == 0 && report.deferred == 0 {
        return format!("{} Nothing to drain", "○".dimmed());
    }

    let mut lines = vec![format!(
        "Drained {} mutations: {} {}",
        report.attempted,
        report.succeeded.to_string().green(),
        "succeeded".green()
    )];
    if report.retained > 0 {
        lines.push(format!("  {} {} kept for retry", "↻".yellow(), report.retained));
    }
    if report.dead_lettered > 0 {
        lines.push(format!(
            "  {} {} moved to dead letters",
            "✗".red(),
            report.dead_lettered
        ));
    }
    if report.conflicts > 0 {
        lines.push(format!("  {} {} conflicts resolved", "⇄".cyan(), report.conflicts));
    }
    if report.deferred > 0 {
        lines.push(format!(
            "  {} {} deferred until back online",
            "○".dimmed(),
            report.deferred
        ));
    }
    lines.join("\n")
}

fn payment_icon(status: PaymentStatus) -> colored::ColoredString {
    match status {
        PaymentStatus::Queued => "○".white(),
        PaymentStatus::CapturedOffline => "◐".cyan(),
        PaymentStatus::PendingSync => "↻".yellow(),
        PaymentStatus::Synced => "✓".green(),
        PaymentStatus::Failed => "✗".red(),
        PaymentStatus::Cancelled => "-".dimmed(),
    }
}

/// Format one payment in detail.
pub fn format_payment_pretty(payment: &OfflinePayment) -> String {
    let mut output = format!(
        "{} {} {} to {}\n",
        payment_icon(payment.status),
        format_minor(payment.effective_amount()).bold(),
        payment.currency,
        payment.recipient.bold()
    );
    let _ = writeln!(output, "  {}: {}", "ID".dimmed(), payment.id);
    let _ = writeln!(output, "  {}: {}", "Status".dimmed(), payment.status);
    let _ = writeln!(output, "  {}: {}", "Method".dimmed(), payment.method);
    let _ = writeln!(
        output,
        "  {}: {}/{}",
        "Retries".dimmed(),
        payment.retry_count,
        payment.max_retries
    );

    if let Some(description) = &payment.description {
        let _ = writeln!(output, "  {}: {}", "Description".dimmed(), description);
    }
    if let Some(capture) = &payment.capture {
        let _ = writeln!(
            output,
            "  {}: {} via {}",
            "Captured".dimmed(),
            format_minor(capture.amount),
            capture.method
        );
    }
    if let Some(remote_ref) = &payment.remote_ref {
        let _ = writeln!(output, "  {}: {}", "Reference".dimmed(), remote_ref);
    }
    if let Some(cancellation) = &payment.cancellation {
        let _ = writeln!(output, "  {}: {}", "Cancelled".dimmed(), cancellation.reason);
    }
    if let Some(conflict) = &payment.pending_conflict {
        let _ = writeln!(
            output,
            "  {}: {}",
            "Conflict".dimmed(),
            conflict.to_string().yellow()
        );
    }
    if let Some(error) = &payment.last_error {
        let _ = writeln!(output, "  {}: {}", "Error".dimmed(), error.red());
    }
    let _ = write!(
        output,
        "  {}: {}",
        "Queued".dimmed(),
        payment.queued_at.format("%Y-%m-%d %H:%M")
    );

    output
}

/// Format a list of payments as a table.
pub fn format_payments_pretty(payments: &[OfflinePayment]) -> String {
    if payments.is_empty() {
        return "Payments (0)\n  No payments".to_string();
    }

    let mut output = format!("Payments ({})\n", payments.len());
    output.push_str(&rule());
    output.push('\n');

    for payment in payments {
        let _ = writeln!(
            output,
            "{} {}  {:>10} {}  {}  {}",
            payment_icon(payment.status),
            short_id(&payment.id).dimmed(),
            format_minor(payment.effective_amount()),
            payment.currency,
            payment.recipient.bold(),
            payment.status.to_string().dimmed()
        );
    }

    output
}

/// Format the result of a payment sync pass.
pub fn format_sync_report_pretty(report: &SyncReport) -> String {
    if report.not_run {
        return format!("{} Payment sync did not run (offline or busy)", "○".dimmed());
    }
    if report.total() == 0 {
        return format!("{} No payments to sync", "○".dimmed());
    }

    let mut lines = Vec::new();
    for result in &report.results {
        let short = short_id(&result.payment_id);
        if result.skipped {
            lines.push(format!(
                "{} {} {}",
                "○".dimmed(),
                short,
                "failed; run `payment retry`".dimmed()
            ));
        } else if result.success {
            lines.push(format!("{} {} {}", "✓".green(), short, result.status));
        } else {
            lines.push(format!(
                "{} {} {}",
                "✗".red(),
                short,
                result.error.as_deref().unwrap_or("failed").red()
            ));
        }
    }
    lines.push(String::new());
    lines.push(format!(
        "Synced {}, failed {}, skipped {}",
        report.succeeded.to_string().green(),
        report.failed.to_string().red(),
        report.skipped
    ));
    lines.join("\n")
}

/// Format payment analytics.
pub fn format_analytics_pretty(analytics: &PaymentAnalytics) -> String {
    let mut lines = vec!["Payment Analytics".bold().to_string(), "─".repeat(40)];
    lines.push(format!("  Total:         {}", analytics.total));
    for (status, count) in &analytics.by_status {
        if *count > 0 {
            lines.push(format!("  {:<14} {count}", format!("{status}:")));
        }
    }

    if !analytics.unsynced_by_currency.is_empty() {
        lines.push(String::new());
        lines.push("Unsynced".bold().to_string());
        for (currency, amount) in &analytics.unsynced_by_currency {
            lines.push(format!("  {currency} {}", format_minor(*amount).yellow()));
        }
    }
    if !analytics.synced_by_currency.is_empty() {
        lines.push(String::new());
        lines.push("Synced".bold().to_string());
        for (currency, amount) in &analytics.synced_by_currency {
            lines.push(format!("  {currency} {}", format_minor(*amount).green()));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "  Failure rate:  {:.1}%",
        analytics.failure_rate * 100.0
    ));
    if analytics.exhausted > 0 {
        lines.push(format!(
            "  Exhausted:     {} {}",
            analytics.exhausted,
            "no retries left".red()
        ));
    }
    if let Some(oldest) = analytics.oldest_unsynced {
        lines.push(format!("  Oldest:        {}", age(oldest).dimmed()));
    }
    lines.join("\n")
}

/// Format the conflict log.
pub fn format_conflicts_pretty(conflicts: &[SyncConflict]) -> String {
    if conflicts.is_empty() {
        return "Conflicts (0)\n  No conflicts recorded".to_string();
    }

    let mut output = format!("Conflicts ({})\n", conflicts.len());
    output.push_str(&rule());
    output.push('\n');

    for conflict in conflicts {
        let icon = if conflict.awaiting_user() {
            "?".yellow()
        } else {
            "✓".green()
        };
        let _ = writeln!(
            output,
            "{} {}  {} {}  {:?}  {}",
            icon,
            conflict.id.to_string().dimmed(),
            conflict.subject.entity,
            conflict.subject.local_ref,
            conflict.kind,
            conflict.resolution.label().bold()
        );
    }

    output
}

/// Format the effect of a manual conflict decision.
pub fn format_conflict_outcome_pretty(outcome: &ConflictOutcome) -> String {
    match outcome {
        ConflictOutcome::Mutation(Some(item)) => format!(
            "{} Requeued {} {}",
            "✓".green(),
            item.action.display_name(),
            short_id(&item.id).dimmed()
        ),
        ConflictOutcome::Mutation(None) => {
            format!("{} Local mutation dropped; remote version kept", "✓".green())
        }
        ConflictOutcome::Payment(Some(payment)) => format!(
            "{} Payment {} is now {}",
            "✓".green(),
            short_id(&payment.id).dimmed(),
            payment.status
        ),
        ConflictOutcome::Payment(None) => {
            format!("{} Conflict settled; no payment was waiting on it", "✓".green())
        }
    }
}
