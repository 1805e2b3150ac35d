//! HTTP utilities for the dashboard REST API

use super::error::{ApiError, FieldErrors, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying a per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// What kind of request produced a response; decides how failures are classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestScope {
    /// Collection read (list, choices, named endpoints)
    Collection,
    /// Single-item read
    Item,
    /// Create/update/delete; `item` is true when addressed by id
    Write { item: bool },
}

impl RequestScope {
    fn is_item(self) -> bool {
        matches!(self, Self::Item | Self::Write { item: true })
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub url: String,
    pub body: String,
}

impl RawResponse {
    /// Turn the response into JSON or a typed error
    pub fn into_json(self, scope: RequestScope) -> Result<Value> {
        if self.status.is_success() {
            // Handle empty response (204, DELETE)
            if self.body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&self.body).map_err(|e| {
                tracing::error!(
                    "Response from {} is not valid JSON: {} - {}",
                    self.url,
                    e,
                    sanitize_for_log(&self.body)
                );
                ApiError::decode(format!("invalid JSON from {}: {}", self.url, e))
            });
        }

        let status = self.status.as_u16();

        if status == 404 && scope.is_item() {
            tracing::debug!("Not found: {}", self.url);
            return Err(ApiError::NotFound { url: self.url });
        }

        // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
        tracing::error!("API error: {} - {}", self.status, sanitize_for_log(&self.body));

        if matches!(scope, RequestScope::Write { .. }) && self.status.is_client_error() {
            if let Some((field_errors, non_field_errors)) = parse_validation_errors(&self.body) {
                return Err(ApiError::Validation {
                    field_errors,
                    non_field_errors,
                });
            }
        }

        Err(ApiError::Http {
            status,
            body: (!self.body.is_empty()).then(|| sanitize_for_log(&self.body)),
        })
    }
}

/// Parse a structured validation payload (`{"field": ["msg", ...], ...}`)
///
/// A string `detail` is the generic message of a non-validation error. When
/// it is present, other string-valued keys (`code`, `status`) are metadata of
/// that error; list and object values are always field errors. Returns `None`
/// when no field or non-field messages remain.
pub fn parse_validation_errors(body: &str) -> Option<(FieldErrors, Vec<String>)> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
        return None;
    };

    let has_detail = map.get("detail").is_some_and(Value::is_string);
    let mut field_errors = FieldErrors::new();
    let mut non_field_errors = Vec::new();

    for (key, value) in &map {
        match (key.as_str(), value) {
            ("detail", Value::String(_)) => continue,
            (_, Value::String(_) | Value::Number(_) | Value::Bool(_)) if has_detail => continue,
            ("non_field_errors" | "__all__", _) => {
                non_field_errors.extend(collect_messages(value))
            }
            _ => collect_field(key, value, &mut field_errors),
        }
    }

    if field_errors.is_empty() && non_field_errors.is_empty() {
        None
    } else {
        Some((field_errors, non_field_errors))
    }
}

fn collect_field(key: &str, value: &Value, out: &mut FieldErrors) {
    match value {
        // Nested serializer errors: {"character": {"name": ["..."]}}
        Value::Object(nested) => {
            for (sub, v) in nested {
                collect_field(&format!("{}.{}", key, sub), v, out);
            }
        }
        other => {
            let messages = collect_messages(other);
            if !messages.is_empty() {
                out.entry(key.to_string()).or_default().extend(messages);
            }
        }
    }
}

fn collect_messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(collect_messages).collect(),
        Value::Null => vec![],
        Value::Object(_) => vec![value.to_string()],
        other => vec![other.to_string()],
    }
}

/// HTTP client wrapper for API calls
#[derive(Clone)]
pub struct ApiHttpClient {
    client: Client,
}

impl ApiHttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("chronicle/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Make a GET request
    pub async fn get(&self, url: Url, headers: HeaderMap) -> Result<RawResponse> {
        self.send(Method::GET, url, headers, None).await
    }

    /// Make a POST request with a JSON body
    pub async fn post(&self, url: Url, headers: HeaderMap, body: &Value) -> Result<RawResponse> {
        self.send(Method::POST, url, headers, Some(body)).await
    }

    /// Make a PATCH request with a JSON body
    pub async fn patch(&self, url: Url, headers: HeaderMap, body: &Value) -> Result<RawResponse> {
        self.send(Method::PATCH, url, headers, Some(body)).await
    }

    /// Make a PUT request with a JSON body
    pub async fn put(&self, url: Url, headers: HeaderMap, body: &Value) -> Result<RawResponse> {
        self.send(Method::PUT, url, headers, Some(body)).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, url: Url, headers: HeaderMap) -> Result<RawResponse> {
        self.send(Method::DELETE, url, headers, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        mut headers: HeaderMap,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let request_id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        tracing::debug!("{} {} [{}]", method, url, request_id);

        let mut request = self.client.request(method, url.clone()).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!("Request to {} failed: {}", url, e);
            ApiError::network(format!("Failed to send request: {}", e))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response body: {}", e)))?;

        Ok(RawResponse {
            status,
            url: url.to_string(),
            body,
        })
    }
}
