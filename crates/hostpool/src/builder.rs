//! Client construction hooks.
//!
//! The cache never builds or tears down clients itself. It hands the
//! caller's [`CreationArgs`] to a [`ClientBuilder`] on a cache miss and gives
//! the built client back to the same builder when the handle is disposed.

use async_trait::async_trait;

use crate::error::BoxError;

/// Arguments for building a client for one destination.
///
/// `key` selects the cache slot; `params` are forwarded to the builder
/// untouched. Two requests with the same key share a client even when their
/// params differ: the first caller's params win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationArgs<P> {
    /// Destination key (e.g. a base URL).
    pub key: String,

    /// Builder-specific construction parameters.
    pub params: P,
}

impl<P> CreationArgs<P> {
    /// Create creation arguments.
    pub fn new(key: impl Into<String>, params: P) -> Self {
        Self {
            key: key.into(),
            params,
        }
    }

    /// The destination key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<P: Default> CreationArgs<P> {
    /// Creation arguments with default params.
    pub fn for_key(key: impl Into<String>) -> Self {
        Self::new(key, P::default())
    }
}

/// Trait for client builders.
///
/// Implement this to plug a concrete client type into the cache.
/// `build` may perform I/O (a handshake, DNS lookup); it runs under the
/// destination's own slot lock, so slow builds only block callers asking
/// for the same destination.
#[async_trait]
pub trait ClientBuilder: Send + Sync + 'static {
    /// Parameters forwarded from [`CreationArgs::params`].
    type Params: Send + Sync;

    /// The client type handed out by the cache.
    type Client: Send + Sync + 'static;

    /// Build a client for the given destination.
    async fn build(&self, args: &CreationArgs<Self::Params>) -> Result<Self::Client, BoxError>;

    /// Release a client's resources.
    ///
    /// Called at most once per built client. Default implementation does
    /// nothing; dropping the last reference is enough for most clients.
    fn dispose(&self, _key: &str, _client: &Self::Client) -> Result<(), BoxError> {
        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBuilder, MockClient};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::{ClientBuilder, CreationArgs};
    use crate::error::BoxError;

    /// Client produced by [`MockBuilder`].
    #[derive(Debug, PartialEq, Eq)]
    pub struct MockClient {
        /// Unique id, increasing in build order.
        pub id: u64,
        /// Destination key it was built for.
        pub key: String,
    }

    #[derive(Default)]
    struct MockState {
        next_id: AtomicU64,
        delay: Mutex<Option<Duration>>,
        failing_builds: Mutex<HashSet<String>>,
        failing_disposals: Mutex<HashSet<String>>,
        builds: Mutex<Vec<String>>,
        disposals: Mutex<Vec<u64>>,
    }

    /// A builder for tests that records every build and disposal.
    ///
    /// Clones share state, so keep one clone to inspect after handing the
    /// other to a cache.
    #[derive(Clone, Default)]
    pub struct MockBuilder {
        state: Arc<MockState>,
    }

    impl MockBuilder {
        /// Create a mock builder that builds instantly and never fails.
        pub fn new() -> Self {
            Self::default()
        }

        /// Sleep for `delay` inside every build.
        pub fn with_delay(self, delay: Duration) -> Self {
            *self.state.delay.lock() = Some(delay);
            self
        }

        /// Make builds for `key` fail until [`MockBuilder::heal`] is called.
        pub fn fail_builds_for(&self, key: impl Into<String>) {
            self.state.failing_builds.lock().insert(key.into());
        }

        /// Make disposals of clients for `key` fail.
        pub fn fail_disposals_for(&self, key: impl Into<String>) {
            self.state.failing_disposals.lock().insert(key.into());
        }

        /// Clear all injected failures.
        pub fn heal(&self) {
            self.state.failing_builds.lock().clear();
            self.state.failing_disposals.lock().clear();
        }

        /// Number of successful builds.
        pub fn build_count(&self) -> usize {
            self.state.builds.lock().len()
        }

        /// Number of successful builds for `key`.
        pub fn builds_for(&self, key: &str) -> usize {
            self.state.builds.lock().iter().filter(|k| *k == key).count()
        }

        /// Number of disposer invocations, including failed ones.
        pub fn dispose_count(&self) -> usize {
            self.state.disposals.lock().len()
        }

        /// Ids of disposed clients, in disposal order.
        pub fn disposed_ids(&self) -> Vec<u64> {
            self.state.disposals.lock().clone()
        }
    }

    #[async_trait]
    impl ClientBuilder for MockBuilder {
        type Params = ();
        type Client = MockClient;

        async fn build(&self, args: &CreationArgs<()>) -> Result<MockClient, BoxError> {
            let delay = *self.state.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if self.state.failing_builds.lock().contains(&args.key) {
                return Err(format!("MockBuilder: refusing to build '{}'", args.key).into());
            }

            self.state.builds.lock().push(args.key.clone());
            Ok(MockClient {
                id: self.state.next_id.fetch_add(1, Ordering::SeqCst),
                key: args.key.clone(),
            })
        }

        fn dispose(&self, key: &str, client: &MockClient) -> Result<(), BoxError> {
            self.state.disposals.lock().push(client.id);
            if self.state.failing_disposals.lock().contains(key) {
                return Err(format!("MockBuilder: refusing to dispose '{key}'").into());
            }
            Ok(())
        }
    }
}
