//! Logging setup for the `hinter` binary.
//!
//! Logs go to stderr so `--json` output on stdout stays machine-readable.
//! `RUST_LOG` wins over `--verbose` when set.

use std::sync::Once;

use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Default level for the given verbosity flag.
pub fn default_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Filter built from `RUST_LOG`, falling back to `default_level(verbose)`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose).to_string().to_lowercase()))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(verbose: bool) {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter(verbose))
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
