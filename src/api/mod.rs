//! Dashboard API interaction module
//!
//! Transport layer for the resource models: typed errors, header injection,
//! the HTTP client and the read retry policy.
//!
//! # Module Structure
//!
//! - [`client`] - Base URL resolution and request dispatch
//! - [`error`] - Error taxonomy shared with the cache and models
//! - [`headers`] - Auth and locale header decorators
//! - [`http`] - HTTP utilities and response classification
//! - [`retry`] - Backoff for retryable reads
//!
//! # Example
//!
//! ```ignore
//! use chronicle::api::{ApiClient, BearerToken, RequestScope};
//!
//! async fn example() -> chronicle::api::Result<()> {
//!     let client = ApiClient::new("https://dashboard.example.com/api/")?
//!         .with_decorator(BearerToken::new("token"));
//!     let url = client.resolve("journal/events/")?;
//!     let events = client.get(url, RequestScope::Collection).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod headers;
pub mod http;
pub mod retry;

pub use client::ApiClient;
pub use error::{format_api_error, ApiError, FieldErrors, Result};
pub use headers::{AcceptLanguage, BearerToken, RequestDecorator, SessionCookie, StaticHeader};
pub use http::RequestScope;
pub use retry::RetryPolicy;
