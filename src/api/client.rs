//! API Client
//!
//! Main client for the dashboard API, combining the base URL, injected
//! headers and HTTP functionality.

use super::error::{ApiError, Result};
use super::headers::RequestDecorator;
use super::http::{ApiHttpClient, RequestScope};
use crate::cache::QueryParams;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Main API client
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    http: ApiHttpClient,
    decorators: Vec<Arc<dyn RequestDecorator>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("decorators", &self.decorators.len())
            .finish()
    }
}

impl ApiClient {
    /// Create a new client rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        // Relative joins drop the last segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)?;

        Ok(Self {
            base_url,
            http: ApiHttpClient::new(timeout)?,
            decorators: Vec::new(),
        })
    }

    /// Add a header decorator (auth, locale, ...)
    pub fn with_decorator(mut self, decorator: impl RequestDecorator + 'static) -> Self {
        self.decorators.push(Arc::new(decorator));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path against the base URL
    ///
    /// Absolute URLs (such as pagination `next` links) are returned unchanged.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(path) {
            return Ok(absolute);
        }
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Resolve a path and append query parameters
    pub fn resolve_with_query(&self, path: &str, params: &QueryParams) -> Result<Url> {
        let mut url = self.resolve(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params.iter() {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for decorator in &self.decorators {
            decorator.decorate(&mut headers);
        }
        headers
    }

    /// GET a URL and decode the JSON body
    pub async fn get(&self, url: Url, scope: RequestScope) -> Result<Value> {
        self.http.get(url, self.headers()).await?.into_json(scope)
    }

    /// POST a JSON body
    pub async fn post(&self, url: Url, body: &Value) -> Result<Value> {
        self.http
            .post(url, self.headers(), body)
            .await?
            .into_json(RequestScope::Write { item: false })
    }

    /// PATCH an item
    pub async fn patch(&self, url: Url, body: &Value) -> Result<Value> {
        self.http
            .patch(url, self.headers(), body)
            .await?
            .into_json(RequestScope::Write { item: true })
    }

    /// PUT an item
    pub async fn put(&self, url: Url, body: &Value) -> Result<Value> {
        self.http
            .put(url, self.headers(), body)
            .await?
            .into_json(RequestScope::Write { item: true })
    }

    /// DELETE an item
    pub async fn delete(&self, url: Url) -> Result<Value> {
        self.http
            .delete(url, self.headers())
            .await?
            .into_json(RequestScope::Write { item: true })
    }
}

impl TryFrom<&crate::config::Config> for ApiClient {
    type Error = ApiError;

    fn try_from(config: &crate::config::Config) -> Result<Self> {
        Self::with_timeout(&config.effective_base_url(), config.timeout())
    }
}
