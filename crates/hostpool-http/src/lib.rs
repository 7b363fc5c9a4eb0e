//! HTTP clients for the hostpool cache.
//!
//! Keys are base URLs. Each destination gets one reqwest client with its own
//! connection pool, and the cache drops clients for destinations that go
//! quiet.
//!
//! ```rust,ignore
//! use hostpool_config::Discovery;
//! use hostpool_http::discover_http_cache;
//!
//! let (cache, _) = discover_http_cache(&Discovery::new());
//! let client = cache.get_or_create(cache.builder().args("https://api.test")).await?;
//! let resp = client.get("health")?.send().await?;
//! ```

pub mod builder;
pub mod client;
pub mod error;

pub use builder::HttpClientBuilder;
pub use client::{BaseUrlClient, HttpParams, parse_base_url};
pub use error::{HttpError, Result};

use hostpool::{ClientCache, PoolConfig};
use hostpool_config::{Discovered, Discovery, HostpoolConfig};
use tracing::{info, warn};

/// A client cache that hands out [`BaseUrlClient`]s.
pub type HttpClientCache = ClientCache<HttpClientBuilder>;

/// Create an HTTP client cache from loaded configuration.
///
/// `[pool]` sets eviction timing and `[http]` sets the builder's defaults.
pub fn http_cache(config: &HostpoolConfig) -> HttpClientCache {
    let pool = PoolConfig::from(&config.pool());
    let builder = HttpClientBuilder::new(HttpParams::from(&config.http()));
    ClientCache::new(builder, pool)
}

/// Discover config files and create an HTTP client cache from them.
///
/// Rejected files are logged and skipped. The returned [`Discovered`] says
/// which files were applied.
pub fn discover_http_cache(discovery: &Discovery) -> (HttpClientCache, Discovered) {
    let found = discovery.load();
    for (path, reason) in found.rejected() {
        warn!(path = %path.display(), reason, "Skipping config file");
    }
    let cache = http_cache(&found.config);
    info!(
        files = found.applied().count(),
        idle_threshold_secs = found.config.pool().idle_threshold_secs,
        sweep_interval_secs = found.config.pool().sweep_interval_secs,
        "HTTP client cache configured"
    );
    (cache, found)
}
