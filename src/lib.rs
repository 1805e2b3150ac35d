//! chronicle - typed, cached resource models for the dashboard REST API
//!
//! - [`api`] - HTTP transport, header injection and the error taxonomy
//! - [`cache`] - Deduplicating, invalidatable query cache
//! - [`resource`] - Descriptors, the generic CRUD engine, domain types and
//!   display-name lookups
//! - [`config`] - Persistent user configuration

pub mod api;
pub mod cache;
pub mod config;
pub mod resource;

/// Version injected at compile time via CHRONICLE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CHRONICLE_VERSION") {
    Some(v) => v,
    None => "dev",
};
