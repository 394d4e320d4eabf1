//! Configuration management for offline-ledger.
//!
//! Paths under `~/.offline-ledger/` and the YAML settings loaded from there.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{
    Config, ConflictConfig, LoggingConfig, PaymentConfig, QueueConfig, RemoteConfig,
};
