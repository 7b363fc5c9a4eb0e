//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [pool]          # idle threshold and sweep interval
//! [logging]       # tracing filter and output format
//! [http]          # defaults for HTTP clients built by the cache
//! [http.headers]  # default headers sent with every request
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostpoolConfig {
    /// Cache eviction settings.
    pub pool: Option<PoolSection>,

    /// Tracing settings.
    pub logging: Option<LoggingConfig>,

    /// HTTP client defaults.
    pub http: Option<HttpSection>,
}

impl HostpoolConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, except `[http.headers]`, which is merged
    /// key by key.
    pub fn merge(&mut self, other: HostpoolConfig) {
        if other.pool.is_some() {
            self.pool = other.pool;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }

        match (&mut self.http, other.http) {
            (Some(current), Some(mut incoming)) => {
                let mut headers = std::mem::take(&mut current.headers);
                headers.append(&mut incoming.headers);
                incoming.headers = headers;
                *current = incoming;
            }
            (current, incoming @ Some(_)) => *current = incoming,
            (_, None) => {}
        }
    }

    /// Check values that parse but make no sense.
    pub fn validate(&self) -> Result<()> {
        if let Some(pool) = &self.pool {
            pool.validate()?;
        }
        if let Some(http) = &self.http {
            http.validate()?;
        }
        Ok(())
    }

    /// Effective pool settings (defaults when the section is absent).
    pub fn pool(&self) -> PoolSection {
        self.pool.clone().unwrap_or_default()
    }

    /// Effective logging settings (defaults when the section is absent).
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Effective HTTP settings (defaults when the section is absent).
    pub fn http(&self) -> HttpSection {
        self.http.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pool Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Client cache eviction configuration.
///
/// ```toml
/// [pool]
/// idle_threshold_secs = 60
/// sweep_interval_secs = 120
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Seconds a client may sit unused before a sweep evicts it.
    pub idle_threshold_secs: u64,
    /// Seconds between eviction sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            idle_threshold_secs: 60,
            sweep_interval_secs: 120,
        }
    }
}

impl PoolSection {
    /// Idle threshold as a `Duration`.
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.idle_threshold_secs == 0 {
            return Err(ConfigError::invalid(
                "pool.idle_threshold_secs",
                "must be greater than zero",
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "pool.sweep_interval_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output configuration.
///
/// ```toml
/// [logging]
/// filter = "hostpool=debug,info"
/// json = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string. `RUST_LOG` overrides it when set.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hostpool=info,hostpool_http=info,warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Defaults applied to every HTTP client the cache builds.
///
/// ```toml
/// [http]
/// timeout_secs = 30
/// connect_timeout_secs = 10
/// user_agent = "my-service/1.0"
///
/// [http.headers]
/// x-team = "core"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Seconds reqwest keeps its own idle sockets open.
    pub pool_idle_timeout_secs: Option<u64>,
    /// User agent; the crate default is used when absent.
    pub user_agent: Option<String>,
    /// Default headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_idle_timeout_secs: None,
            user_agent: None,
            headers: BTreeMap::new(),
        }
    }
}

impl HttpSection {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "http.timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "http.connect_timeout_secs",
                "must be greater than zero",
            ));
        }
        if let Some(name) = self.headers.keys().find(|name| name.trim().is_empty()) {
            return Err(ConfigError::invalid(
                format!("http.headers.{name:?}"),
                "header name must not be empty",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
