//! Offline mutation queue.
//!
//! This module queues entity mutations made while offline (or as
//! write-behind) and replays them against the remote API.
//!
//! Features:
//! - Closed set of mutation actions for transactions and invoices
//! - Snapshot drains in enqueue order with a bounded retry budget
//! - Dead-letter store for exhausted or conflict-parked items
//! - Per-dispatch timeout and cancellation on disconnect
//! - Conflict routing through the configured resolver

pub mod dead_letter;
pub mod dispatcher;
pub mod item;
pub mod queue;

pub use dead_letter::{DeadLetter, DeadLetterReason};
pub use dispatcher::{
    dispatch_guarded, ActionDispatcher, DispatchFailure, DispatchOutcome, FailureKind,
    HttpDispatcher,
};
pub use item::{MutationAction, MutationPayload, QueueItem};
pub use queue::{DrainReport, MutationQueueManager, QueueEvent, QueueStatus};
