//! HTTP builder error types.

use thiserror::Error;

/// Errors raised while building an HTTP client or a request URL.
///
/// Build failures reach cache callers wrapped in `hostpool::Error::Build`.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The destination key is not a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The destination key uses a scheme other than http or https.
    #[error("Unsupported scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),

    /// A default header could not be encoded.
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader {
        /// Header name as configured.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// reqwest refused the client configuration.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for HTTP builder operations.
pub type Result<T> = std::result::Result<T, HttpError>;
