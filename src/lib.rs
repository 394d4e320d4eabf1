//! offline-ledger - offline mutation queue and sync core
//!
//! This crate queues transaction and invoice mutations and offline payments
//! while a device is disconnected, stores them durably, and replays them
//! against the remote API when connectivity returns.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod logging;
pub mod network;
pub mod output;
pub mod remote;
pub mod service;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::LedgerError;
pub use network::{ConnectivityProvider, NetworkStateMonitor};
pub use service::SyncService;
