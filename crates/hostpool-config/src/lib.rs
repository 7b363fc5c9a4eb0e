//! Configuration system for hostpool.
//!
//! Provides TOML-based configuration with:
//! - `[pool]` eviction settings (idle threshold, sweep interval)
//! - `[logging]` tracing filter and format
//! - `[http]` defaults for HTTP clients built by the cache
//! - Config file layering (user config dir + project-local overrides) with a
//!   per-file report of what was applied or rejected

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    Discovered, Discovery, Layer, LayerReport, LayerStatus, read_config, user_config_dir,
};
pub use error::{ConfigError, Result};
pub use types::*;
