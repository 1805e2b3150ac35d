//! Configuration Management
//!
//! Handles persistent configuration storage for chronicle. Credentials are
//! never written to disk; they come from the command line or environment.

use crate::cache::CacheOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Base URL used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";

pub const ENV_BASE_URL: &str = "CHRONICLE_BASE_URL";
pub const ENV_TOKEN: &str = "CHRONICLE_TOKEN";
pub const ENV_LOCALE: &str = "CHRONICLE_LOCALE";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// API root, e.g. https://dashboard.example.com/api/
    #[serde(default)]
    pub base_url: Option<String>,
    /// Locale sent as Accept-Language
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retries for failed reads
    #[serde(default)]
    pub retries: Option<u32>,
    /// Cached reads older than this are refetched; unset means until invalidated
    #[serde(default)]
    pub stale_time_secs: Option<u64>,
    /// Unwatched cache entries are dropped after this long
    #[serde(default)]
    pub gc_time_secs: Option<u64>,
    /// Last listed resource
    #[serde(default)]
    pub last_resource: Option<String>,
    /// Command-line values; take precedence and are never saved
    #[serde(skip)]
    base_url_override: Option<String>,
    #[serde(skip)]
    locale_override: Option<String>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chronicle").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_json(&content),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Parse configuration, falling back to defaults on malformed content
    pub fn from_json(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config: {}", e);
            Self::default()
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get effective base URL (CLI > env > config > default)
    pub fn effective_base_url(&self) -> String {
        self.effective_base_url_with(std::env::var(ENV_BASE_URL).ok())
    }

    fn effective_base_url_with(&self, env: Option<String>) -> String {
        self.base_url_override
            .clone()
            .or_else(|| env.filter(|v| !v.trim().is_empty()))
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Get effective locale (CLI > env > config)
    pub fn effective_locale(&self) -> Option<String> {
        self.locale_override
            .clone()
            .or_else(|| std::env::var(ENV_LOCALE).ok().filter(|v| !v.trim().is_empty()))
            .or_else(|| self.locale.clone())
    }

    /// Access token from the environment
    pub fn env_token() -> Option<String> {
        std::env::var(ENV_TOKEN).ok().filter(|v| !v.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }

    pub fn stale_time(&self) -> Option<Duration> {
        self.stale_time_secs.map(Duration::from_secs)
    }

    pub fn cache_options(&self) -> CacheOptions {
        let defaults = CacheOptions::default();
        CacheOptions {
            stale_time: self.stale_time(),
            gc_time: self
                .gc_time_secs
                .map_or(defaults.gc_time, Duration::from_secs),
        }
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, base_url: Option<String>, locale: Option<String>) -> Self {
        self.base_url_override = base_url;
        self.locale_override = locale;
        self
    }

    /// Set last resource and save
    pub fn set_last_resource(&mut self, resource: &str) -> Result<()> {
        self.last_resource = Some(resource.to_string());
        self.save()
    }
}
