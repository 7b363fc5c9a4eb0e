//! Background eviction scheduling.
//!
//! The scheduler owns at most one sweeper task. Enabling spawns it, and
//! disabling cancels it. The task disables itself once a sweep leaves its
//! target empty. Every enable starts a new generation, and a task only ever
//! disables its own generation, so a stale task cannot stop its successor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{MAX_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL};

/// Something the scheduler can sweep.
pub trait Sweep: Send + Sync + 'static {
    /// Run one eviction pass. Must not fail or block on I/O.
    fn sweep(&self) -> SweepReport;

    /// Whether there is nothing left to sweep.
    fn is_empty(&self) -> bool;
}

/// Whether the background sweep is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No sweeper task exists.
    Disabled,
    /// A sweeper task fires every sweep interval.
    Enabled,
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Cached handles whose idle time was checked.
    pub examined: usize,

    /// Handles removed and disposed.
    pub evicted: usize,

    /// Slots skipped because a caller held them.
    pub busy: usize,

    /// Disposals that returned an error.
    pub dispose_failures: usize,

    /// Handles left in the cache after the pass.
    pub remaining: usize,
}

struct Running {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    running: Option<Running>,
    next_generation: u64,
}

struct Shared {
    interval: Duration,
    state: Mutex<State>,
    sweeps: AtomicU64,
}

/// Periodic sweeper with self-managed start/stop.
pub struct EvictionScheduler {
    shared: Arc<Shared>,
}

impl EvictionScheduler {
    /// Create a disabled scheduler that sweeps every `interval` once enabled.
    ///
    /// The interval is clamped the same way as [`PoolConfig::with_sweep_interval`].
    ///
    /// [`PoolConfig::with_sweep_interval`]: crate::PoolConfig::with_sweep_interval
    pub fn new(interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                interval: interval.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL),
                state: Mutex::new(State::default()),
                sweeps: AtomicU64::new(0),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        if self.shared.state.lock().running.is_some() {
            SchedulerState::Enabled
        } else {
            SchedulerState::Disabled
        }
    }

    /// Number of completed sweeps across all generations.
    pub fn sweeps(&self) -> u64 {
        self.shared.sweeps.load(Ordering::Relaxed)
    }

    /// The sweep interval.
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Start sweeping `target`. No-op if already enabled.
    ///
    /// Returns `true` if this call started a sweeper.
    pub fn enable<T: Sweep>(&self, target: &Arc<T>) -> bool {
        self.enable_with(target, || ()).1
    }

    /// Run `f` and enable under the scheduler lock.
    ///
    /// Callers use this to make "cache became non-empty" and "sweeper is
    /// running" one atomic step with respect to the sweeper's own
    /// empty-check-then-disable.
    pub fn enable_with<T, F, R>(&self, target: &Arc<T>, f: F) -> (R, bool)
    where
        T: Sweep,
        F: FnOnce() -> R,
    {
        let mut state = self.shared.state.lock();
        let value = f();
        if state.running.is_some() {
            return (value, false);
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime available, eviction sweeper not started");
            return (value, false);
        };

        let generation = state.next_generation;
        state.next_generation += 1;
        let cancel = CancellationToken::new();
        state.running = Some(Running {
            generation,
            cancel: cancel.clone(),
        });

        runtime.spawn(run_sweeper(
            Arc::clone(&self.shared),
            Arc::downgrade(target),
            generation,
            cancel,
        ));

        info!(
            generation,
            interval_ms = u64::try_from(self.shared.interval.as_millis()).unwrap_or(u64::MAX),
            "Eviction sweeper enabled"
        );
        (value, true)
    }

    /// Stop sweeping. No-op if already disabled.
    ///
    /// Returns `true` if a running sweeper was cancelled.
    pub fn disable(&self) -> bool {
        let mut state = self.shared.state.lock();
        match state.running.take() {
            Some(running) => {
                running.cancel.cancel();
                info!(generation = running.generation, "Eviction sweeper disabled");
                true
            }
            None => false,
        }
    }
}

impl Drop for EvictionScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.shared.state.lock().running.take() {
            running.cancel.cancel();
        }
    }
}

impl Shared {
    /// Disable if `generation` is still current and `target` is empty.
    ///
    /// Returns `true` when the calling task should exit.
    fn disable_if_empty<T: Sweep>(&self, generation: u64, target: &T) -> bool {
        let mut state = self.state.lock();
        let current = state
            .running
            .as_ref()
            .is_some_and(|r| r.generation == generation);
        if !current {
            return true;
        }
        if !target.is_empty() {
            return false;
        }

        if let Some(running) = state.running.take() {
            running.cancel.cancel();
        }
        info!(generation, "Cache empty, eviction sweeper disabled");
        true
    }
}

async fn run_sweeper<T: Sweep>(
    shared: Arc<Shared>,
    target: Weak<T>,
    generation: u64,
    cancel: CancellationToken,
) {
    let period = shared.interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(target) = target.upgrade() else {
            debug!(generation, "Cache dropped, stopping eviction sweeper");
            break;
        };

        let report = target.sweep();
        shared.sweeps.fetch_add(1, Ordering::Relaxed);

        if report.evicted > 0 || report.dispose_failures > 0 {
            debug!(
                generation,
                examined = report.examined,
                evicted = report.evicted,
                busy = report.busy,
                dispose_failures = report.dispose_failures,
                remaining = report.remaining,
                "Sweep evicted idle clients"
            );
        } else {
            trace!(generation, examined = report.examined, "Sweep found nothing idle");
        }

        if shared.disable_if_empty(generation, target.as_ref()) {
            break;
        }
    }

    trace!(generation, "Eviction sweeper exited");
}
