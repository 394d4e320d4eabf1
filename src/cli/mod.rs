//! Command-line interface for offline-ledger.

pub mod args;
pub mod commands;
