//! Error types for client cache operations.

/// Boxed error crossing the builder boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for client cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The destination key was empty or whitespace.
    #[error("destination key must not be empty")]
    EmptyKey,

    /// The builder failed to construct a client.
    #[error("failed to build client for '{key}': {source}")]
    Build {
        /// Destination the client was being built for.
        key: String,
        #[source]
        source: BoxError,
    },

    /// The builder failed to release a client.
    #[error("failed to dispose client for '{key}': {source}")]
    Dispose {
        /// Destination the client served.
        key: String,
        #[source]
        source: BoxError,
    },

    /// The cache has been shut down and no longer hands out clients.
    #[error("client cache has been shut down")]
    ShutDown,

    /// Tracing could not be initialized.
    #[error("failed to initialize tracing: {0}")]
    Telemetry(String),
}

impl Error {
    /// Check if this error came from client construction.
    pub fn is_build(&self) -> bool {
        matches!(self, Error::Build { .. })
    }
}

/// Result type for client cache operations.
pub type Result<T> = std::result::Result<T, Error>;
