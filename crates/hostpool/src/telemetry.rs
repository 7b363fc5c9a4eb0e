//! Tracing setup for processes embedding the cache.

use hostpool_config::LoggingConfig;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{Error, Result};

/// Install a global tracing subscriber from the `[logging]` section.
///
/// `RUST_LOG`, when set, takes precedence over the configured filter.
/// Fails instead of panicking if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| Error::Telemetry(format!("invalid filter '{}': {e}", config.filter)))?;

    let registry = tracing_subscriber::registry();
    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_filter(filter))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_filter(filter))
            .try_init()
    };

    result.map_err(|e| Error::Telemetry(e.to_string()))
}
