//! Tracing subscriber setup.

use sta_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive that overrides the
/// configured level.
pub const LOG_ENV: &str = "STA_LOG";

/// The filter `init_tracing` installs: `STA_LOG` when it parses, otherwise
/// the configured level.
#[must_use]
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install a global `fmt` subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}
