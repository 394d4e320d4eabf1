use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::payments::{PaymentMethod, PaymentStatus};
use crate::features::sync::MutationAction;

#[derive(Parser)]
#[command(name = "offline-ledger")]
#[command(about = "Offline mutation queue and payment sync for financial records")]
#[command(long_about = "offline-ledger - offline-first sync for transactions, invoices and payments

Mutations and payments made while offline are stored durably and replayed
against the remote API when connectivity returns. Failed mutations are
retried up to a fixed budget and then dead-lettered; payments wait for an
explicit retry or cancel.

QUICK START:
  offline-ledger status                         Show queue and payment status
  offline-ledger enqueue create-transaction --data '{\"amount\": 12.5}'
  offline-ledger drain                          Replay queued mutations
  offline-ledger payment queue 12.34 EUR \"Bakery\"   Queue a payment

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Data directory (defaults to ~/.offline-ledger)
    #[arg(long, global = true, env = "OFFLINE_LEDGER_HOME")]
    pub home: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Treat the device as offline; nothing is sent to the remote
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show queue, payment, and conflict status
    ///
    /// # Examples
    ///
    ///   offline-ledger status
    ///   offline-ledger status -o json
    #[command(alias = "s")]
    Status,

    /// Queue a mutation for the remote API
    ///
    /// The mutation is stored durably first. When online it is sent right
    /// away; otherwise it waits for the next drain.
    ///
    /// # Examples
    ///
    ///   offline-ledger enqueue create-transaction --data '{"amount": 42.0}'
    ///   offline-ledger enqueue update-invoice --entity-id inv_9 --data '{"status": "paid"}'
    Enqueue(EnqueueArgs),

    /// Replay queued mutations now
    Drain {
        /// Reset every item's retry count before draining
        #[arg(long)]
        force: bool,
    },

    /// Drain mutations and sync payments concurrently
    Sync,

    /// Inspect or clear the mutation queue
    Queue(QueueArgs),

    /// Manage mutations that left the queue unsent
    #[command(name = "dead-letter", alias = "dlq")]
    DeadLetter(DeadLetterArgs),

    /// Queue, capture, and sync offline payments
    #[command(alias = "pay")]
    Payment(PaymentArgs),

    /// Review and resolve sync conflicts
    Conflicts(ConflictsArgs),

    /// Generate shell completions
    ///
    /// # Examples
    ///
    ///   offline-ledger completions zsh > ~/.zsh/completions/_offline-ledger
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Arguments for `enqueue`.
#[derive(Args)]
pub struct EnqueueArgs {
    /// Mutation to perform
    #[arg(value_enum)]
    pub action: MutationAction,

    /// Request body as JSON
    #[arg(long, short = 'd', default_value = "{}")]
    pub data: String,

    /// Remote id of the entity (required for updates and deletes)
    #[arg(long, short = 'e')]
    pub entity_id: Option<String>,

    /// API key sent with this mutation
    #[arg(long, env = "OFFLINE_LEDGER_API_KEY", hide_env_values = true)]
    pub auth_token: Option<String>,
}

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Mutation queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// List pending mutations in dispatch order
    List {
        /// Only items for this remote entity id
        #[arg(long, short = 'e')]
        entity: Option<String>,
    },

    /// Drop every pending mutation
    ///
    /// Dead letters are kept.
    Clear {
        /// Confirm the clear
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
pub struct DeadLetterArgs {
    #[command(subcommand)]
    pub command: DeadLetterCommands,
}

/// Dead-letter subcommands.
#[derive(Subcommand)]
pub enum DeadLetterCommands {
    /// List dead-lettered mutations
    List,

    /// Put a dead-lettered mutation back in the queue with a fresh budget
    Requeue {
        /// Queue item id
        id: Uuid,
    },

    /// Permanently drop a dead-lettered mutation
    Discard {
        /// Queue item id
        id: Uuid,
    },
}

#[derive(Args)]
pub struct PaymentArgs {
    #[command(subcommand)]
    pub command: PaymentCommands,
}

/// Payment subcommands.
#[derive(Subcommand)]
pub enum PaymentCommands {
    /// Queue a new payment
    ///
    /// # Examples
    ///
    ///   offline-ledger payment queue 12.34 EUR "Corner Bakery" --method card
    Queue {
        /// Amount as a decimal (e.g. 12.34)
        #[arg(value_parser = parse_amount)]
        amount: i64,

        /// ISO 4217 currency code
        currency: String,

        /// Who is paid
        recipient: String,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,

        /// Payment method
        #[arg(long, value_enum, default_value = "cash")]
        method: PaymentMethod,
    },

    /// Record offline capture for a queued payment
    Capture {
        /// Payment id
        id: Uuid,

        /// Captured amount if it differs from the queued amount
        #[arg(long, value_parser = parse_amount)]
        amount: Option<i64>,

        /// Capture method if it differs from the queued method
        #[arg(long, value_enum)]
        method: Option<PaymentMethod>,

        /// Receipt number or other proof of capture
        #[arg(long)]
        evidence: Option<String>,
    },

    /// Sync every payment that is not terminal
    Sync,

    /// Spend one retry on a payment
    Retry {
        /// Payment id
        id: Uuid,
    },

    /// Cancel a payment that has not synced
    Cancel {
        /// Payment id
        id: Uuid,

        /// Why the payment is cancelled
        #[arg(long, short = 'r')]
        reason: String,
    },

    /// List payments
    List {
        /// Only payments in this status
        #[arg(long, short = 's', value_enum)]
        status: Option<PaymentStatus>,
    },

    /// Show one payment
    Show {
        /// Payment id
        id: Uuid,
    },

    /// Show payment analytics
    Analytics,

    /// Remove synced and cancelled payments
    Purge {
        /// Only payments last updated more than this many days ago
        #[arg(long, default_value = "30")]
        older_than_days: i64,
    },
}

#[derive(Args)]
pub struct ConflictsArgs {
    #[command(subcommand)]
    pub command: ConflictCommands,
}

/// Conflict subcommands.
#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List recorded conflicts
    List {
        /// Only conflicts awaiting a decision
        #[arg(long)]
        pending: bool,
    },

    /// Settle a conflict that awaits a decision
    ///
    /// # Examples
    ///
    ///   offline-ledger conflicts resolve <ID> keep-local
    ///   offline-ledger conflicts resolve <ID> merge --data '{"amount": 10}'
    Resolve {
        /// Conflict id
        id: Uuid,

        /// Decision to apply
        #[arg(value_enum)]
        decision: Decision,

        /// Merged record as JSON (required for `merge`)
        #[arg(long, short = 'd')]
        data: Option<String>,
    },

    /// Remove settled conflicts
    Purge {
        /// Only conflicts settled more than this many days ago
        #[arg(long, default_value = "30")]
        older_than_days: i64,
    },
}

/// A user's conflict decision.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Keep the device's version and overwrite the remote
    KeepLocal,
    /// Keep the remote version and drop the local change
    KeepRemote,
    /// Send a merged record
    Merge,
}

static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Whole units, then at most two decimal places
    Regex::new(r"^(\d{1,13})(?:\.(\d{1,2}))?$")
        .unwrap_or_else(|e| panic!("Invalid amount regex: {e}"))
});

/// Parse a decimal amount into minor units.
///
/// Accepts `12`, `12.3`, and `12.34`.
///
/// # Errors
///
/// Returns a message for anything else, including zero.
pub fn parse_amount(s: &str) -> Result<i64, String> {
    let caps = AMOUNT_PATTERN
        .captures(s.trim())
        .ok_or_else(|| format!("invalid amount '{s}': expected e.g. 12.34"))?;

    let invalid = |e: std::num::ParseIntError| format!("invalid amount '{s}': {e}");
    let whole: i64 = caps[1].parse().map_err(invalid)?;
    let cents: i64 = match caps.get(2).map(|m| m.as_str()) {
        None => 0,
        Some(digits) => {
            let value: i64 = digits.parse().map_err(invalid)?;
            if digits.len() == 1 {
                value * 10
            } else {
                value
            }
        }
    };

    let amount = whole * 100 + cents;
    if amount == 0 {
        return Err("amount must be greater than zero".to_string());
    }
    Ok(amount)
}
