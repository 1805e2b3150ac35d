//! API Errors
//!
//! Typed failure taxonomy shared by the HTTP layer, the query cache and the
//! resource models. Errors are `Clone` so a single failed fetch can be
//! replayed to every caller waiting on it.

use std::collections::BTreeMap;

/// Field name -> messages, as returned by the server on a rejected write
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors produced by resource operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response was received (connect failure, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-2xx status
    #[error("API request failed: {status}")]
    Http { status: u16, body: Option<String> },

    /// 404 on an item-scoped request
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    /// Structured 4xx rejection of a create/update payload
    #[error("Validation failed for {}", describe_fields(.field_errors, .non_field_errors))]
    Validation {
        field_errors: FieldErrors,
        non_field_errors: Vec<String>,
    },

    /// Response body did not match the declared shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// No descriptor registered under this name
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Descriptor has no URL for the requested action
    #[error("Resource {resource} has no {action} URL")]
    MissingUrl { resource: String, action: String },

    /// A URL could not be built from the base URL and a path
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

fn describe_fields(fields: &FieldErrors, non_field: &[String]) -> String {
    let mut parts: Vec<&str> = fields.keys().map(String::as_str).collect();
    if !non_field.is_empty() {
        parts.push("non_field_errors");
    }
    if parts.is_empty() {
        "request".to_string()
    } else {
        parts.join(", ")
    }
}

impl ApiError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn missing_url(resource: &str, action: &str) -> Self {
        Self::MissingUrl {
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    /// HTTP status attached to this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Transport failures, 5xx and 429 are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Field-level errors of a validation failure
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { field_errors, .. } => Some(field_errors),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Result type alias for resource operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Format an API error for display
/// Security: keeps raw response bodies out of user-facing text
pub fn format_api_error(error: &ApiError) -> String {
    match error {
        ApiError::Network(_) => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        ApiError::Http { status: 401, .. } => {
            "Authentication failed. Check your access token.".to_string()
        }
        ApiError::Http { status: 403, .. } => {
            "Permission denied. Your role does not allow this action.".to_string()
        }
        ApiError::Http { status: 409, .. } => {
            "Resource conflict. The resource may already exist or be in use.".to_string()
        }
        ApiError::Http { status: 429, .. } => {
            "Rate limit exceeded. Please try again later.".to_string()
        }
        ApiError::Http { status, .. } if *status >= 500 => {
            "Service temporarily unavailable. Please try again.".to_string()
        }
        ApiError::Http { .. } => "Invalid request. Check your parameters.".to_string(),
        ApiError::NotFound { .. } => "Resource not found.".to_string(),
        ApiError::Validation {
            field_errors,
            non_field_errors,
        } => {
            let mut lines: Vec<String> = non_field_errors.clone();
            for (field, messages) in field_errors {
                lines.push(format!("{}: {}", field, messages.join(" ")));
            }
            lines.join("\n")
        }
        ApiError::Decode(_) => "Unexpected response from server.".to_string(),
        other => other.to_string(),
    }
}
