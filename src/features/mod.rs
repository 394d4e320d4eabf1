//! Feature implementations for offline-ledger.
//!
//! - Mutation queue for transactions and invoices
//! - Payment queue
//! - Conflict resolution shared by both queues

mod busy;
pub mod conflict;
pub mod payments;
pub mod sync;
