//! [`ClientBuilder`] implementation backed by reqwest.

use async_trait::async_trait;
use hostpool::{BoxError, ClientBuilder, CreationArgs};
use tracing::debug;

use crate::client::{BaseUrlClient, HttpParams};

/// Builds one [`BaseUrlClient`] per destination base URL.
///
/// The cache key is the base URL. Callers that don't care about per-request
/// parameters can use [`HttpClientBuilder::args`] to get creation arguments
/// carrying the builder's defaults.
#[derive(Debug, Clone, Default)]
pub struct HttpClientBuilder {
    defaults: HttpParams,
}

impl HttpClientBuilder {
    /// Create a builder with the given default parameters.
    pub fn new(defaults: HttpParams) -> Self {
        Self { defaults }
    }

    /// Default parameters used by [`Self::args`].
    pub fn defaults(&self) -> &HttpParams {
        &self.defaults
    }

    /// Creation arguments for `base_url` using the builder's defaults.
    pub fn args(&self, base_url: impl Into<String>) -> CreationArgs<HttpParams> {
        CreationArgs::new(base_url, self.defaults.clone())
    }
}

#[async_trait]
impl ClientBuilder for HttpClientBuilder {
    type Params = HttpParams;
    type Client = BaseUrlClient;

    async fn build(&self, args: &CreationArgs<HttpParams>) -> Result<BaseUrlClient, BoxError> {
        let client = BaseUrlClient::new(args.key(), &args.params)?;
        debug!(
            base_url = %client.base_url(),
            timeout_ms = u64::try_from(args.params.timeout.as_millis()).unwrap_or(u64::MAX),
            headers = args.params.headers.len(),
            "Built HTTP client"
        );
        Ok(client)
    }

    fn dispose(&self, key: &str, _client: &BaseUrlClient) -> Result<(), BoxError> {
        // reqwest closes pooled connections when the last clone drops.
        debug!(key, "Released HTTP client");
        Ok(())
    }
}
