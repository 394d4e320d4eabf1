//! Tracing subscriber setup.
//!
//! Logs always go to stderr so JSON output on stdout stays parseable.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Pick the filter directive: `RUST_LOG`, else `--verbose`, else config.
#[must_use]
pub fn filter_for(verbose: bool, config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if verbose {
        return EnvFilter::new("offline_ledger=debug,info");
    }
    EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(verbose: bool, config: &LoggingConfig) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose);

    let _ = tracing_subscriber::registry()
        .with(filter_for(verbose, config))
        .with(console_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_falls_back() {
        let config = LoggingConfig {
            level: "not a [valid directive".to_string(),
        };
        // Must not panic
        let _ = filter_for(false, &config);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        init(false, &config);
        init(true, &config);
    }
}
