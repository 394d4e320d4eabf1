//! Path resolution for offline-ledger configuration and data files.
//!
//! All data is stored in `~/.offline-ledger/` unless `OFFLINE_LEDGER_HOME`
//! points somewhere else:
//! - `config.yaml` - Main configuration file
//! - `ledger.db` - SQLite database holding the durable queues

use std::path::PathBuf;

use crate::error::LedgerError;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "OFFLINE_LEDGER_HOME";

/// Paths to offline-ledger configuration and data.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.offline-ledger/`
    pub root: PathBuf,
    /// Config file: `~/.offline-ledger/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.offline-ledger/ledger.db`
    pub database: PathBuf,
}

impl Paths {
    /// Resolve paths from `OFFLINE_LEDGER_HOME` or the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, LedgerError> {
        if let Ok(root) = std::env::var(HOME_ENV) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME").map_err(|_| {
            LedgerError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".offline-ledger")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("ledger.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), LedgerError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                LedgerError::Config(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-ledger");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("ledger.db"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested").join("root"));

        paths.ensure_dirs().unwrap();

        assert!(paths.root.exists());
    }
}
