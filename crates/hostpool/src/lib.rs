//! Keyed cache of reusable network clients with idle-based eviction.
//!
//! This crate keeps one client per destination key so callers don't pay for
//! building a new connection-capable client on every request:
//! - Per-key get-or-create: one build per key, unrelated keys never wait on it
//! - Idle tracking on every use
//! - A background sweeper that starts with the first cached client and stops
//!   once a sweep leaves the cache empty
//!
//! Client construction is delegated to a [`ClientBuilder`].
//!
//! # Example
//!
//! ```rust,ignore
//! use hostpool::{ClientCache, CreationArgs, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .with_idle_threshold(Duration::from_secs(60))
//!     .with_sweep_interval(Duration::from_secs(120));
//!
//! let cache = ClientCache::new(builder, config);
//! let client = cache.get_or_create(CreationArgs::for_key("https://a.test")).await?;
//! ```

mod builder;
mod cache;
mod config;
mod error;
mod handle;
mod scheduler;
pub mod telemetry;

pub use builder::{ClientBuilder, CreationArgs};
#[cfg(any(test, feature = "testing"))]
pub use builder::{MockBuilder, MockClient};
pub use cache::{CacheStats, ClientCache};
pub use config::{
    DEFAULT_IDLE_THRESHOLD, DEFAULT_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL,
    PoolConfig,
};
pub use error::{BoxError, Error, Result};
pub use handle::ResourceHandle;
pub use scheduler::{EvictionScheduler, SchedulerState, Sweep, SweepReport};
