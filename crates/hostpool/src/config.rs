//! Configuration for the client cache.

use std::time::Duration;

use hostpool_config::PoolSection;

/// Default idle time after which a cached client becomes eligible for eviction.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(60);

/// Default interval between eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Shortest sweep interval accepted.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Longest sweep interval accepted. Larger values would overflow the timer.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for the client cache.
///
/// The two durations are independent. With the defaults a client can stay
/// cached for up to `idle_threshold + sweep_interval` after its last use,
/// since eviction only happens when a sweep fires.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Clients idle for strictly longer than this are evicted by a sweep.
    pub idle_threshold: Duration,

    /// Period of the background sweep while the cache is non-empty.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle threshold.
    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    /// Set the sweep interval.
    ///
    /// Clamped to [`MIN_SWEEP_INTERVAL`]..=[`MAX_SWEEP_INTERVAL`].
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
        self
    }
}

impl From<&PoolSection> for PoolConfig {
    fn from(section: &PoolSection) -> Self {
        Self::new()
            .with_idle_threshold(section.idle_threshold())
            .with_sweep_interval(section.sweep_interval())
    }
}
