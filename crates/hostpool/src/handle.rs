//! Cached client handles with last-use tracking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::builder::ClientBuilder;
use crate::error::{Error, Result};

/// One cached client plus its usage metadata.
///
/// The handle owns the client until it is disposed. Callers receive clones
/// of the inner `Arc`, so a client stays memory-safe after disposal; the
/// disposer only releases whatever the builder attached to it.
#[derive(Debug)]
pub struct ResourceHandle<C> {
    key: String,
    client: Arc<C>,
    created_at: Instant,
    last_used: Mutex<Instant>,
    disposed: AtomicBool,
}

impl<C> ResourceHandle<C> {
    /// Wrap a freshly built client. The handle starts out as just used.
    pub fn new(key: impl Into<String>, client: C) -> Self {
        let now = Instant::now();
        Self {
            key: key.into(),
            client: Arc::new(client),
            created_at: now,
            last_used: Mutex::new(now),
            disposed: AtomicBool::new(false),
        }
    }

    /// Mark the handle as used now and return the client.
    pub fn touch(&self) -> Arc<C> {
        let now = Instant::now();
        let mut last_used = self.last_used.lock();
        if now > *last_used {
            *last_used = now;
        }
        Arc::clone(&self.client)
    }

    /// Time elapsed between the last use and `now`. Does not touch.
    pub fn idle_duration(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_used.lock())
    }

    /// When the handle was last touched.
    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    /// When the client was built.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Destination key this handle serves.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Peek at the client without touching.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Whether [`ResourceHandle::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release the client through the builder's disposer.
    ///
    /// Only the first call reaches the disposer and returns `Ok(true)` (or
    /// its error). Later calls return `Ok(false)`.
    pub fn dispose<B>(&self, builder: &B) -> Result<bool>
    where
        B: ClientBuilder<Client = C>,
    {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        builder
            .dispose(&self.key, &self.client)
            .map(|()| true)
            .map_err(|source| Error::Dispose {
                key: self.key.clone(),
                source,
            })
    }
}
