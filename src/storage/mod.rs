//! Storage layer for offline-ledger.
//!
//! This module provides durable persistence for:
//! - Mutation queue and its dead letters
//! - Offline payments
//! - Conflict log

mod database;
mod kv;
mod migrations;
mod queue_store;

pub use database::Database;
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use queue_store::{keys, PersistentQueueStore};

#[cfg(test)]
pub(crate) use kv::testing;
