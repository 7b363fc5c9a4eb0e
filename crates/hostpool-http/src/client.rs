//! HTTP client bound to one base URL.

use std::collections::BTreeMap;
use std::time::Duration;

use hostpool_config::HttpSection;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{HttpError, Result};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for establishing connections.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction parameters for an HTTP client.
///
/// These travel inside `CreationArgs`; only the first request for a
/// destination decides how its client is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpParams {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// How long reqwest keeps idle sockets in its own pool.
    pub pool_idle_timeout: Option<Duration>,
    /// Custom user agent.
    pub user_agent: Option<String>,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: None,
            user_agent: None,
            headers: BTreeMap::new(),
        }
    }
}

impl HttpParams {
    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Add a default header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| HttpError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}

impl From<&HttpSection> for HttpParams {
    fn from(section: &HttpSection) -> Self {
        Self {
            timeout: section.timeout(),
            connect_timeout: section.connect_timeout(),
            pool_idle_timeout: section.pool_idle_timeout_secs.map(Duration::from_secs),
            user_agent: section.user_agent.clone(),
            headers: section.headers.clone(),
        }
    }
}

/// Parse a destination key into a base URL with a trailing slash.
pub fn parse_base_url(key: &str) -> Result<Url> {
    let mut base_url = Url::parse(key.trim())?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(HttpError::UnsupportedScheme(base_url.scheme().to_string()));
    }
    if !base_url.path().ends_with('/') {
        base_url.set_path(&format!("{}/", base_url.path()));
    }
    Ok(base_url)
}

/// An HTTP client whose request paths resolve against a fixed base URL.
#[derive(Debug)]
pub struct BaseUrlClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BaseUrlClient {
    /// Build a client for `base_url` with the given parameters.
    pub fn new(base_url: &str, params: &HttpParams) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;

        let user_agent = params
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("hostpool-http/{}", env!("CARGO_PKG_VERSION")));

        let mut builder = reqwest::Client::builder()
            .default_headers(params.header_map()?)
            .user_agent(user_agent)
            .timeout(params.timeout)
            .connect_timeout(params.connect_timeout);
        if let Some(idle) = params.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the underlying reqwest client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Resolve `path` against the base URL.
    ///
    /// Leading slashes are ignored so paths never escape a base path prefix.
    pub fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.base_url.join(path).map_err(HttpError::from)
    }

    /// Start a request with an arbitrary method.
    pub fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self.http.request(method, self.url(path)?))
    }

    /// Start a GET request.
    pub fn get(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        self.request(Method::GET, path)
    }

    /// Start a POST request.
    pub fn post(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        self.request(Method::POST, path)
    }

    /// Start a DELETE request.
    pub fn delete(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        self.request(Method::DELETE, path)
    }
}
