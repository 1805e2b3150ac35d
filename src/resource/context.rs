//! Resource Context
//!
//! The one place a client, a cache and a retry policy are tied together.
//! Applications build a context at startup and hand it to whatever needs
//! data; tests build their own for isolation.

use super::display::DisplayNames;
use super::model::ResourceModel;
use super::models::Resource;
use super::registry::{get_resource, ResourceDescriptor};
use crate::api::{ApiClient, ApiError, Result, RetryPolicy};
use crate::cache::QueryCache;
use serde::de::DeserializeOwned;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ResourceContext {
    client: ApiClient,
    cache: QueryCache,
    retry: RetryPolicy,
}

impl ResourceContext {
    /// Context with a fresh cache and the default retry policy
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            cache: QueryCache::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Typed model for a registered resource
    pub fn model<T: Resource>(&self) -> Result<ResourceModel<T>> {
        self.model_by_name(T::MODEL_NAME)
    }

    /// Model for a registered resource by name, decoding into any shape
    pub fn model_by_name<T: DeserializeOwned>(&self, name: &str) -> Result<ResourceModel<T>> {
        let descriptor =
            get_resource(name).ok_or_else(|| ApiError::UnknownResource(name.to_string()))?;
        Ok(self.model_for(descriptor.clone()))
    }

    /// Model for a descriptor built outside the registry
    pub fn model_for<T: DeserializeOwned>(&self, descriptor: ResourceDescriptor) -> ResourceModel<T> {
        ResourceModel::new(
            Arc::new(descriptor),
            self.client.clone(),
            self.cache.clone(),
            self.retry,
        )
    }

    /// Label lookups over this context's cache
    pub fn display_names(&self) -> DisplayNames {
        DisplayNames::new(self.cache.clone())
    }
}
