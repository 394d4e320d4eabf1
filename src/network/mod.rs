//! Device connectivity.

mod monitor;

pub use monitor::{ConnectivityProvider, NetworkStateMonitor};
