//! Diagnostic logging on stderr. Run output proper goes to stdout.

use anyhow::{anyhow, Result};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const DEFAULT_FILTER: &str = "warn";

/// `--log-level` wins over `RUST_LOG`; with neither only warnings are shown.
pub fn filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => {
            EnvFilter::try_new(level).map_err(|e| anyhow!("invalid log level '{}': {}", level, e))
        }
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

pub fn init(level: Option<&str>) -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(filter(level)?)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
