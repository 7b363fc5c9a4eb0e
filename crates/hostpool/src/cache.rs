//! Keyed client cache with per-destination locking and idle eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::builder::{ClientBuilder, CreationArgs};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::handle::ResourceHandle;
use crate::scheduler::{EvictionScheduler, SchedulerState, Sweep, SweepReport};

/// Contents of one destination slot.
enum SlotState<C> {
    /// Nobody has built a client yet (or the last build was abandoned).
    Vacant,
    /// A client is cached.
    Ready(Arc<ResourceHandle<C>>),
    /// The slot was removed from the map; waiters must look up a fresh one.
    Retired,
}

/// Per-destination slot.
///
/// `gate` serializes builders, touches and removals for one key. `state` is
/// only changed while `gate` is held, but may be read without it for peeks.
struct Slot<C> {
    gate: tokio::sync::Mutex<()>,
    state: parking_lot::Mutex<SlotState<C>>,
}

impl<C> Slot<C> {
    fn vacant() -> Self {
        Self {
            gate: tokio::sync::Mutex::new(()),
            state: parking_lot::Mutex::new(SlotState::Vacant),
        }
    }

    fn ready(&self) -> Option<Arc<ResourceHandle<C>>> {
        match &*self.state.lock() {
            SlotState::Ready(handle) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    fn is_vacant(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Vacant)
    }

    fn is_retired(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Retired)
    }

    fn fill(&self, handle: Arc<ResourceHandle<C>>) {
        *self.state.lock() = SlotState::Ready(handle);
    }

    /// Retire the slot, returning the handle it held.
    fn retire(&self) -> Option<Arc<ResourceHandle<C>>> {
        match std::mem::replace(&mut *self.state.lock(), SlotState::Retired) {
            SlotState::Ready(handle) => Some(handle),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Counters {
    builds: AtomicU64,
    build_failures: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
    removals: AtomicU64,
    dispose_failures: AtomicU64,
}

/// Retires and detaches a slot that is still vacant when dropped.
struct VacancyGuard<'a, B: ClientBuilder> {
    inner: &'a CacheInner<B>,
    key: &'a str,
    slot: &'a Arc<Slot<B::Client>>,
}

impl<B: ClientBuilder> Drop for VacancyGuard<'_, B> {
    fn drop(&mut self) {
        if self.slot.is_vacant() {
            self.slot.retire();
            self.inner.detach(self.key, self.slot);
        }
    }
}

/// State shared between cache clones and the sweeper task.
struct CacheInner<B: ClientBuilder> {
    slots: parking_lot::Mutex<HashMap<String, Arc<Slot<B::Client>>>>,
    builder: B,
    config: PoolConfig,
    scheduler: EvictionScheduler,
    live: AtomicUsize,
    shut_down: AtomicBool,
    counters: Counters,
}

impl<B: ClientBuilder> CacheInner<B> {
    /// Find or insert the slot for `key`. Holds the map lock only briefly.
    fn slot_for(&self, key: &str) -> Arc<Slot<B::Client>> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(Slot::vacant());
        slots.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    fn lookup(&self, key: &str) -> Option<Arc<Slot<B::Client>>> {
        self.slots.lock().get(key).cloned()
    }

    /// Remove `key` from the map if it still points at `slot`.
    fn detach(&self, key: &str, slot: &Arc<Slot<B::Client>>) {
        let mut slots = self.slots.lock();
        if let Some(current) = slots.get(key)
            && Arc::ptr_eq(current, slot)
        {
            slots.remove(key);
        }
    }

    /// Dispose an evicted or removed handle, recording failures.
    fn release(&self, handle: &ResourceHandle<B::Client>) -> Result<()> {
        match handle.dispose(&self.builder) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.counters.dispose_failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %handle.key(), error = %e, "Failed to dispose client");
                Err(e)
            }
        }
    }

    fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl<B: ClientBuilder> Sweep for CacheInner<B> {
    fn sweep(&self) -> SweepReport {
        let snapshot: Vec<(String, Arc<Slot<B::Client>>)> = self
            .slots
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut report = SweepReport::default();

        for (key, slot) in snapshot {
            // A held gate means a caller is building or touching this key.
            let Ok(gate) = slot.gate.try_lock() else {
                report.busy += 1;
                continue;
            };

            if slot.is_vacant() {
                // Abandoned build; drop the empty slot.
                slot.retire();
                self.detach(&key, &slot);
                continue;
            }

            let Some(handle) = slot.ready() else {
                continue;
            };
            report.examined += 1;

            let idle = handle.idle_duration(Instant::now());
            if idle <= self.config.idle_threshold {
                continue;
            }

            slot.retire();
            self.detach(&key, &slot);
            self.live.fetch_sub(1, Ordering::AcqRel);
            drop(gate);

            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            report.evicted += 1;
            debug!(
                key = %key,
                idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
                "Evicting idle client"
            );

            if self.release(&handle).is_err() {
                report.dispose_failures += 1;
            }
        }

        report.remaining = self.len();
        report
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keyed cache of reusable clients.
///
/// At most one client exists per destination key. The first request for a
/// key builds a client through the [`ClientBuilder`]; later requests reuse it
/// and refresh its last-use time. A background sweeper evicts clients idle
/// for longer than the configured threshold. It starts when a client is
/// cached and stops when a sweep leaves the cache empty.
///
/// Clones share the same cache. The sweeper holds only a weak reference, so
/// dropping every clone stops it.
pub struct ClientCache<B: ClientBuilder> {
    inner: Arc<CacheInner<B>>,
}

impl<B: ClientBuilder> ClientCache<B> {
    /// Create an empty cache. The sweeper stays off until the first client
    /// is cached.
    pub fn new(builder: B, config: PoolConfig) -> Self {
        let scheduler = EvictionScheduler::new(config.sweep_interval);
        Self {
            inner: Arc::new(CacheInner {
                slots: parking_lot::Mutex::new(HashMap::new()),
                builder,
                config,
                scheduler,
                live: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the builder.
    pub fn builder(&self) -> &B {
        &self.inner.builder
    }

    /// Return the cached client for `args.key`, building it on a miss.
    ///
    /// Concurrent callers for the same key wait for a single build and all
    /// receive the same client. Callers for other keys are not held up by
    /// that build. A failed build caches nothing and is reported as
    /// [`Error::Build`]; the next call for the key tries again.
    pub async fn get_or_create(&self, args: CreationArgs<B::Params>) -> Result<Arc<B::Client>> {
        if args.key.trim().is_empty() {
            return Err(Error::EmptyKey);
        }

        loop {
            if self.inner.shut_down.load(Ordering::Acquire) {
                return Err(Error::ShutDown);
            }

            let slot = self.inner.slot_for(&args.key);
            let _gate = slot.gate.lock().await;

            if slot.is_retired() {
                trace!(key = %args.key, "Slot retired while waiting, retrying");
                continue;
            }

            if let Some(handle) = slot.ready() {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %args.key, "Client found in cache");
                return Ok(handle.touch());
            }

            // Dropped before `_gate`: a build that never fills the slot
            // retires it while waiters are still queued on it.
            let vacancy = VacancyGuard {
                inner: self.inner.as_ref(),
                key: &args.key,
                slot: &slot,
            };

            debug!(key = %args.key, "Client cache miss, building");
            let built = self.inner.builder.build(&args).await;

            if self.inner.shut_down.load(Ordering::Acquire) {
                drop(vacancy);
                if let Ok(client) = built {
                    debug!(key = %args.key, "Cache shut down during build, releasing client");
                    let handle = ResourceHandle::new(args.key.clone(), client);
                    let _ = self.inner.release(&handle);
                }
                return Err(Error::ShutDown);
            }

            match built {
                Ok(client) => {
                    let handle = Arc::new(ResourceHandle::new(args.key.clone(), client));
                    let client = handle.touch();
                    slot.fill(handle);
                    drop(vacancy);
                    self.inner.counters.builds.fetch_add(1, Ordering::Relaxed);

                    let (size, _) = self.inner.scheduler.enable_with(&self.inner, || {
                        self.inner.live.fetch_add(1, Ordering::AcqRel) + 1
                    });
                    debug!(key = %args.key, cache_size = size, "Client built and cached");

                    return Ok(client);
                }
                Err(source) => {
                    drop(vacancy);
                    self.inner
                        .counters
                        .build_failures
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(key = %args.key, error = %source, "Client build failed");
                    return Err(Error::Build {
                        key: args.key,
                        source,
                    });
                }
            }
        }
    }

    /// Remove and dispose the client for `key`.
    ///
    /// Returns `Ok(false)` if nothing was cached. The key is removed even
    /// when the disposer fails; the failure is returned.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let Some(slot) = self.inner.lookup(key) else {
            return Ok(false);
        };

        let gate = slot.gate.lock().await;
        let handle = slot.retire();
        self.inner.detach(key, &slot);
        drop(gate);

        let Some(handle) = handle else {
            return Ok(false);
        };

        self.inner.live.fetch_sub(1, Ordering::AcqRel);
        self.inner.counters.removals.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Client removed from cache");

        self.inner.release(&handle)?;
        Ok(true)
    }

    /// Remove and dispose every cached client. Returns how many were cached.
    ///
    /// Each slot leaves the map only once its lock is held, so an in-flight
    /// build finishes first and callers queued behind it retry against a
    /// fresh slot. Disposal failures are logged and counted.
    pub async fn flush(&self) -> usize {
        let snapshot: Vec<(String, Arc<Slot<B::Client>>)> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut flushed = 0;
        for (key, slot) in snapshot {
            let gate = slot.gate.lock().await;
            let handle = slot.retire();
            self.inner.detach(&key, &slot);
            drop(gate);

            if let Some(handle) = handle {
                self.inner.live.fetch_sub(1, Ordering::AcqRel);
                self.inner.counters.removals.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "Flushing client");
                let _ = self.inner.release(&handle);
                flushed += 1;
            }
        }

        debug!(flushed, "Client cache flushed");
        flushed
    }

    /// Dispose every client and refuse further requests, then stop the
    /// sweeper.
    ///
    /// Builds already running when this is called are released as soon as
    /// they finish and their callers get [`Error::ShutDown`]. Returns how
    /// many cached clients were disposed. Safe to call more than once.
    pub async fn shutdown(&self) -> usize {
        self.inner.shut_down.store(true, Ordering::Release);
        let flushed = self.flush().await;
        self.inner.scheduler.disable();
        info!(flushed, "Client cache shut down");
        flushed
    }

    /// Whether [`ClientCache::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Run one eviction pass now, independent of the sweeper's schedule.
    ///
    /// Does not change the scheduler state.
    pub fn sweep_now(&self) -> SweepReport {
        self.inner.sweep()
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if no client is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// Check if a client is cached for `key` (without touching it).
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .lookup(key)
            .is_some_and(|slot| slot.ready().is_some())
    }

    /// How long the client for `key` has been idle, without touching it.
    pub fn idle_for(&self, key: &str) -> Option<Duration> {
        self.inner
            .lookup(key)
            .and_then(|slot| slot.ready())
            .map(|handle| handle.idle_duration(Instant::now()))
    }

    /// Keys with a cached client.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.ready().is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Current sweeper state.
    pub fn scheduler_state(&self) -> SchedulerState {
        self.inner.scheduler.state()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            size: self.len(),
            builds: counters.builds.load(Ordering::Relaxed),
            build_failures: counters.build_failures.load(Ordering::Relaxed),
            hits: counters.hits.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            removals: counters.removals.load(Ordering::Relaxed),
            dispose_failures: counters.dispose_failures.load(Ordering::Relaxed),
            sweeps: self.inner.scheduler.sweeps(),
            scheduler: self.inner.scheduler.state(),
        }
    }
}

impl<B: ClientBuilder> Clone for ClientCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of cached clients.
    pub size: usize,

    /// Successful client builds.
    pub builds: u64,

    /// Failed client builds.
    pub build_failures: u64,

    /// Requests served from the cache.
    pub hits: u64,

    /// Clients evicted by sweeps.
    pub evictions: u64,

    /// Clients removed explicitly or by flush/shutdown.
    pub removals: u64,

    /// Disposals that returned an error.
    pub dispose_failures: u64,

    /// Completed background sweeps.
    pub sweeps: u64,

    /// Sweeper state.
    pub scheduler: SchedulerState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MockBuilder;

    fn config() -> PoolConfig {
        PoolConfig::new()
            .with_idle_threshold(Duration::from_secs(60))
            .with_sweep_interval(Duration::from_secs(120))
    }

    fn cache() -> (ClientCache<MockBuilder>, MockBuilder) {
        let builder = MockBuilder::new();
        (ClientCache::new(builder.clone(), config()), builder)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_builds_once() {
        let (cache, builder) = cache();

        let first = cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();
        let second = cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.build_count(), 1);
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_key_rejected() {
        let (cache, builder) = cache();

        let err = cache.get_or_create(CreationArgs::for_key("")).await.unwrap_err();
        assert!(matches!(err, Error::EmptyKey));
        let err = cache.get_or_create(CreationArgs::for_key("  ")).await.unwrap_err();
        assert!(matches!(err, Error::EmptyKey));

        assert_eq!(builder.build_count(), 0);
        assert_eq!(cache.scheduler_state(), SchedulerState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_exact_strings() {
        let (cache, builder) = cache();

        cache.get_or_create(CreationArgs::for_key("https://a.test")).await.unwrap();
        cache.get_or_create(CreationArgs::for_key("https://A.test")).await.unwrap();

        assert_eq!(builder.build_count(), 2);
        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec!["https://A.test", "https://a.test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_insert_enables_scheduler() {
        let (cache, _) = cache();
        assert_eq!(cache.scheduler_state(), SchedulerState::Disabled);

        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();
        assert_eq!(cache.scheduler_state(), SchedulerState::Enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_failure_caches_nothing() {
        let (cache, builder) = cache();
        builder.fail_builds_for("a");

        let err = cache.get_or_create(CreationArgs::for_key("a")).await.unwrap_err();
        assert!(err.is_build());
        assert!(cache.is_empty());
        assert!(!cache.contains("a"));
        assert_eq!(cache.scheduler_state(), SchedulerState::Disabled);
        assert_eq!(cache.stats().build_failures, 1);

        builder.heal();
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_now_evicts_only_idle() {
        let (cache, builder) = cache();
        cache.get_or_create(CreationArgs::for_key("old")).await.unwrap();

        tokio::time::advance(Duration::from_secs(50)).await;
        cache.get_or_create(CreationArgs::for_key("fresh")).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        let report = cache.sweep_now();

        assert_eq!(report.examined, 2);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.remaining, 1);
        assert!(!cache.contains("old"));
        assert!(cache.contains("fresh"));
        assert_eq!(builder.disposed_ids(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_equal_to_threshold_survives() {
        let (cache, _) = cache();
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.sweep_now().evicted, 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.sweep_now().evicted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_for_does_not_touch() {
        let (cache, _) = cache();
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.idle_for("a"), Some(Duration::from_secs(61)));
        assert_eq!(cache.idle_for("missing"), None);
        assert_eq!(cache.sweep_now().evicted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_skips_busy_slot() {
        let (cache, _) = cache();
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(90)).await;

        let slot = cache.inner.lookup("a").unwrap();
        let gate = slot.gate.lock().await;
        let report = cache.sweep_now();
        assert_eq!(report.busy, 1);
        assert_eq!(report.evicted, 0);
        drop(gate);

        assert_eq!(cache.sweep_now().evicted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let (cache, builder) = cache();
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        assert!(cache.remove("a").await.unwrap());
        assert!(!cache.remove("a").await.unwrap());
        assert!(!cache.remove("never").await.unwrap());
        assert!(cache.is_empty());
        assert_eq!(builder.dispose_count(), 1);
        assert_eq!(cache.stats().removals, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_reports_dispose_failure_but_drops_key() {
        let (cache, builder) = cache();
        builder.fail_disposals_for("a");
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        let err = cache.remove("a").await.unwrap_err();
        assert!(matches!(err, Error::Dispose { .. }));
        assert!(!cache.contains("a"));
        assert_eq!(cache.stats().dispose_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_after_remove() {
        let (cache, builder) = cache();
        let first = cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();
        cache.remove("a").await.unwrap();
        let second = cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(builder.builds_for("a"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_disposes_everything() {
        let (cache, builder) = cache();
        for key in ["a", "b", "c"] {
            cache.get_or_create(CreationArgs::for_key(key)).await.unwrap();
        }

        assert_eq!(cache.flush().await, 3);
        assert!(cache.is_empty());
        assert_eq!(builder.dispose_count(), 3);

        // Still usable after a flush.
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_requests() {
        let (cache, builder) = cache();
        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        assert_eq!(cache.shutdown().await, 1);
        assert!(cache.is_shut_down());
        assert_eq!(cache.scheduler_state(), SchedulerState::Disabled);
        assert_eq!(builder.dispose_count(), 1);

        let err = cache.get_or_create(CreationArgs::for_key("a")).await.unwrap_err();
        assert!(matches!(err, Error::ShutDown));
        assert_eq!(cache.shutdown().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_build_leaves_no_slot() {
        let builder = MockBuilder::new().with_delay(Duration::from_secs(5));
        let cache = ClientCache::new(builder.clone(), config());

        let pending = cache.get_or_create(CreationArgs::for_key("a"));
        let timed_out = tokio::time::timeout(Duration::from_secs(1), pending).await;
        assert!(timed_out.is_err());

        // Gone without waiting for a sweep; the sweeper never started.
        assert!(cache.inner.lookup("a").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.scheduler_state(), SchedulerState::Disabled);

        cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();
        assert_eq!(builder.build_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_build_leaves_no_slot() {
        let (cache, builder) = cache();
        builder.fail_builds_for("a");

        assert!(cache.get_or_create(CreationArgs::for_key("a")).await.is_err());
        assert!(cache.inner.lookup("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_build_refuses_the_client() {
        let builder = MockBuilder::new().with_delay(Duration::from_secs(5));
        let cache = ClientCache::new(builder.clone(), config());

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_create(CreationArgs::for_key("a")).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(cache.shutdown().await, 0);
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ShutDown));

        assert_eq!(builder.disposed_ids(), vec![0]);
        assert_eq!(cache.scheduler_state(), SchedulerState::Disabled);
        assert!(cache.is_empty());
        assert!(cache.inner.lookup("a").is_none());
        assert_eq!(cache.stats().builds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_waits_for_in_flight_build() {
        let builder = MockBuilder::new().with_delay(Duration::from_secs(5));
        let cache = ClientCache::new(builder.clone(), config());
        let start = Instant::now();

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_create(CreationArgs::for_key("a")).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let flush = tokio::spawn({
            let cache = cache.clone();
            async move { cache.flush().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Queues behind the running build instead of starting another one.
        let second = cache.get_or_create(CreationArgs::for_key("a")).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap().id, 0);
        assert_eq!(flush.await.unwrap(), 1);
        assert_eq!(second.id, 1);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "builds overlapped: {elapsed:?}");
        assert_eq!(builder.builds_for("a"), 2);
        assert_eq!(builder.disposed_ids(), vec![0]);
        assert_eq!(cache.len(), 1);
    }
}
