//! Resource Model
//!
//! One generic CRUD engine for every resource. A model is a descriptor plus
//! the shared client and cache; reads go through the cache, writes go
//! straight to the server and invalidate the resource's cache namespace
//! before they report success.

use super::display::{parse_choices, Choice};
use super::page::Page;
use super::registry::{ResourceDescriptor, UpdateMethod};
use crate::api::{ApiClient, ApiError, RequestScope, Result, RetryPolicy};
use crate::cache::{fetcher, CacheKey, Fetcher, QueryCache, QueryParams, QuerySubscription};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use url::Url;

/// Typed CRUD access to one resource
pub struct ResourceModel<T> {
    descriptor: Arc<ResourceDescriptor>,
    client: ApiClient,
    cache: QueryCache,
    retry: RetryPolicy,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceModel<T> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            client: self.client.clone(),
            cache: self.cache.clone(),
            retry: self.retry,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for ResourceModel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceModel")
            .field("resource", &self.descriptor.name())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(resource: &str, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| {
        tracing::error!(
            "Response for {} does not match its declared shape: {}",
            resource,
            e
        );
        ApiError::decode(format!("{}: {}", resource, e))
    })
}

fn encode(payload: &impl Serialize) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| ApiError::decode(format!("Failed to encode payload: {}", e)))
}

impl<T: DeserializeOwned> ResourceModel<T> {
    pub fn new(
        descriptor: Arc<ResourceDescriptor>,
        client: ApiClient,
        cache: QueryCache,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            descriptor,
            client,
            cache,
            retry,
            _marker: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Resource name (the cache namespace)
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Fetcher for a cached GET, retried per the model's policy
    fn read_fetcher(&self, url: Url, scope: RequestScope) -> Fetcher {
        let client = self.client.clone();
        let retry = self.retry;
        fetcher(move || {
            let client = client.clone();
            let url = url.clone();
            async move { retry.run(|| client.get(url.clone(), scope)).await }
        })
    }

    /// Cached GET decoded with `decode`
    ///
    /// A payload that fails to decode marks its entry errored, so the next
    /// read refetches instead of serving it again.
    async fn read_as<R>(
        &self,
        key: CacheKey,
        url: Url,
        scope: RequestScope,
        decode: impl FnOnce(&Value) -> Result<R>,
    ) -> Result<R> {
        let value = self.cache.read(&key, self.read_fetcher(url, scope)).await?;
        decode(&value).inspect_err(|err| {
            self.cache.reject(&key, &value, err.clone());
        })
    }

    async fn read_page(&self, url: Url, key: CacheKey) -> Result<Page<T>> {
        let name = self.name();
        self.read_as(key, url, RequestScope::Collection, |value| {
            Page::from_value(value)?.decode(name)
        })
        .await
    }

    /// Cache key of a pagination link
    ///
    /// Links back to the collection share the list keys; links elsewhere
    /// (cursor endpoints) are keyed by their full URL.
    fn page_key(&self, collection: &Url, url: &Url) -> CacheKey {
        let params = QueryParams::from_url(url);
        if url.origin() == collection.origin() && url.path() == collection.path() {
            return CacheKey::list(self.name(), &params);
        }
        let mut target = url.clone();
        target.set_query(None);
        CacheKey::named(self.name(), target.as_str(), &params)
    }

    /// Fetch one page of the collection
    pub async fn list_page(&self, params: &QueryParams) -> Result<Page<T>> {
        let url = self
            .client
            .resolve_with_query(self.descriptor.url(), params)?;
        self.read_page(url, CacheKey::list(self.name(), params))
            .await
    }

    /// Fetch the collection (first page when the server paginates)
    pub async fn list(&self, params: &QueryParams) -> Result<Vec<T>> {
        Ok(self.list_page(params).await?.results)
    }

    /// Fetch every page by following `next` links
    pub async fn list_all(&self, params: &QueryParams) -> Result<Vec<T>> {
        let collection = self.client.resolve(self.descriptor.url())?;
        let mut url = self
            .client
            .resolve_with_query(self.descriptor.url(), params)?;
        let mut key = CacheKey::list(self.name(), params);
        let mut seen = HashSet::new();
        let mut all_items = Vec::new();

        loop {
            seen.insert(url.to_string());
            let page = self.read_page(url, key).await?;
            all_items.extend(page.results);

            let Some(next) = page.next else {
                break;
            };
            let next_url = self.client.resolve(&next)?;
            if seen.contains(next_url.as_str()) {
                tracing::warn!("Pagination for {} loops back to {}, stopping", self.name(), next);
                break;
            }
            key = self.page_key(&collection, &next_url);
            url = next_url;
        }

        Ok(all_items)
    }

    /// Fetch one instance; 404 yields [`ApiError::NotFound`]
    pub async fn get(&self, id: impl Display) -> Result<T> {
        let id = id.to_string();
        let url = self.client.resolve(&self.descriptor.item_url(&id))?;
        let key = CacheKey::item(self.name(), &id);
        self.read_as(key, url, RequestScope::Item, |value| decode(self.name(), value))
            .await
    }

    /// Create an instance and return the server's canonical copy
    pub async fn create(&self, payload: &impl Serialize) -> Result<T> {
        let body = encode(payload)?;
        let url = self.client.resolve(self.descriptor.create_url())?;
        tracing::info!("Creating {}", self.name());

        let value = self.client.post(url, &body).await?;
        self.invalidate();

        let created = decode(self.name(), &value)?;
        // Seed the new item's key; it has no earlier payload to go stale
        if let Some(id) = value.get(&self.descriptor.id_field).filter(|v| !v.is_null()) {
            let id = id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string());
            self.cache.set_data(&CacheKey::item(self.name(), id), value);
        }
        Ok(created)
    }

    /// Update an instance with the descriptor's verb (PATCH unless declared PUT)
    pub async fn update(&self, id: impl Display, payload: &impl Serialize) -> Result<T> {
        self.write(id, payload, self.descriptor.update_method).await
    }

    /// Replace an instance with PUT
    pub async fn replace(&self, id: impl Display, payload: &impl Serialize) -> Result<T> {
        self.write(id, payload, UpdateMethod::Put).await
    }

    async fn write(
        &self,
        id: impl Display,
        payload: &impl Serialize,
        method: UpdateMethod,
    ) -> Result<T> {
        let id = id.to_string();
        let body = encode(payload)?;
        let url = self.client.resolve(&self.descriptor.item_url(&id))?;
        tracing::info!("Updating {} {} ({:?})", self.name(), id, method);

        let value = match method {
            UpdateMethod::Patch => self.client.patch(url, &body).await?,
            UpdateMethod::Put => self.client.put(url, &body).await?,
        };
        self.invalidate();

        decode(self.name(), &value)
    }

    /// Delete an instance
    pub async fn delete(&self, id: impl Display) -> Result<()> {
        let id = id.to_string();
        let url = self.client.resolve(&self.descriptor.item_url(&id))?;
        tracing::info!("Deleting {} {}", self.name(), id);

        self.client.delete(url).await?;
        self.invalidate();
        Ok(())
    }

    /// Fetch the choices listing used for display names
    pub async fn choices(&self) -> Result<Vec<Choice>> {
        let path = self
            .descriptor
            .choices_url()
            .ok_or_else(|| ApiError::missing_url(self.name(), "choices"))?;
        let url = self.client.resolve(path)?;
        self.read_as(CacheKey::choices(self.name()), url, RequestScope::Collection, |value| {
            Ok(parse_choices(value, None))
        })
        .await
    }

    /// Cached GET of a named extra endpoint, decoded into any shape
    pub async fn fetch_named<R: DeserializeOwned>(
        &self,
        url_name: &str,
        params: &QueryParams,
    ) -> Result<R> {
        let path = self
            .descriptor
            .named_url(url_name)
            .ok_or_else(|| ApiError::missing_url(self.name(), url_name))?;
        let url = self.client.resolve_with_query(path, params)?;
        let key = CacheKey::named(self.name(), url_name, params);
        self.read_as(key, url, RequestScope::Collection, |value| decode(self.name(), value))
            .await
    }

    /// Watch the cache entry backing `list(params)`
    pub fn subscribe_list(&self, params: &QueryParams) -> QuerySubscription {
        self.cache.subscribe(&CacheKey::list(self.name(), params))
    }

    /// Watch the cache entry backing `get(id)`
    pub fn subscribe_item(&self, id: impl Display) -> QuerySubscription {
        self.cache.subscribe(&CacheKey::item(self.name(), id))
    }

    /// Mark every cached read of this resource stale
    pub fn invalidate(&self) -> usize {
        self.cache.invalidate_namespace(self.name())
    }
}
