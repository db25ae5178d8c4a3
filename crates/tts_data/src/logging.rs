//! Logging setup for the `tts-data` binary.
//!
//! Installs a global `tracing` subscriber writing to stderr. The filter is
//! taken from `RUST_LOG` and falls back to [`DEFAULT_FILTER`].

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "info";

/// Builds the filter from `RUST_LOG`, or `DEFAULT_FILTER` when it is unset
/// or invalid.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initializes the global subscriber.
///
/// # Errors
/// Fails if a global subscriber has already been installed.
pub fn init() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
