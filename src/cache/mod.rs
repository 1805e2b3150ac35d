//! Query Cache
//!
//! Keyed cache of in-flight and completed fetches shared by every resource
//! model built from the same [`ResourceContext`](crate::resource::ResourceContext).
//!
//! Each key moves through `idle -> pending -> resolved | errored`:
//!
//! - the first [`QueryCache::read`] of a key runs the fetcher on a spawned
//!   task; concurrent reads of the same key wait on that one fetch
//! - a fetch error is stored and replayed to every waiter, and the next read
//!   tries again
//! - [`QueryCache::invalidate`] marks the entry stale; entries with live
//!   subscribers are refetched in the background while the old payload stays
//!   visible to them, and the next read always waits for fresh data
//!
//! Every fetch carries the entry generation it was started for. Invalidating
//! bumps the generation, so a fetch that was already running when a mutation
//! landed still answers its own waiters but never overwrites the entry.
//!
//! Entries nobody watches or fetches are evicted once unused for
//! [`CacheOptions::gc_time`]. Idle entries go as soon as their last
//! subscriber detaches.
//!
//! Cache state lives behind a `std::sync::Mutex` that is never held across
//! an `.await`.

mod key;

pub use key::{CacheKey, KeyScope, QueryParams};

use crate::api::{ApiError, Result};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// How long an unobserved entry is kept by default
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(300);

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Freshness and retention settings of a [`QueryCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Resolved data older than this is refetched by the next read; `None`
    /// keeps it fresh until invalidated
    pub stale_time: Option<Duration>,
    /// Entries with no subscriber and no running fetch are evicted once
    /// unused for this long
    pub gc_time: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            stale_time: None,
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

/// Outcome of a cached fetch, shared between all waiters
pub type FetchResult = Result<Arc<Value>>;

/// Produces the network request for a key; called once per fetch
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`]
pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Lifecycle state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Known key, never fetched
    Idle,
    /// A fetch is running
    Pending,
    Resolved,
    Errored,
}

/// Point-in-time view of an entry, as delivered to subscribers
#[derive(Debug, Clone)]
pub struct QuerySnapshot {
    pub status: QueryStatus,
    /// Last successful payload (kept visible while refetching or after an error)
    pub data: Option<Arc<Value>>,
    pub error: Option<ApiError>,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
}

impl QuerySnapshot {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_stale: false,
            updated_at: None,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Pending
    }
}

struct InFlight {
    rx: watch::Receiver<Option<FetchResult>>,
}

struct Entry {
    id: u64,
    last_used: Instant,
    data: Option<Arc<Value>>,
    error: Option<ApiError>,
    updated_at: Option<Instant>,
    stale: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    fetcher: Option<Fetcher>,
    notify: watch::Sender<QuerySnapshot>,
}

impl Entry {
    fn new() -> Self {
        let (notify, _) = watch::channel(QuerySnapshot::idle());
        Self {
            id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
            last_used: Instant::now(),
            data: None,
            error: None,
            updated_at: None,
            stale: false,
            generation: 0,
            in_flight: None,
            fetcher: None,
            notify,
        }
    }

    fn status(&self) -> QueryStatus {
        if self.in_flight.is_some() {
            QueryStatus::Pending
        } else if self.error.is_some() {
            QueryStatus::Errored
        } else if self.data.is_some() {
            QueryStatus::Resolved
        } else {
            QueryStatus::Idle
        }
    }

    fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            status: self.status(),
            data: self.data.clone(),
            error: self.error.clone(),
            is_stale: self.stale,
            updated_at: self.updated_at,
        }
    }

    /// Payload that may be served without a fetch
    fn fresh_data(&self, stale_time: Option<Duration>) -> Option<Arc<Value>> {
        if self.stale || self.error.is_some() {
            return None;
        }
        let data = self.data.as_ref()?;
        match (stale_time, self.updated_at) {
            (Some(limit), Some(at)) if at.elapsed() >= limit => None,
            _ => Some(data.clone()),
        }
    }

    fn has_subscribers(&self) -> bool {
        self.notify.receiver_count() > 0
    }

    fn is_collectable(&self, gc_time: Duration) -> bool {
        self.in_flight.is_none() && !self.has_subscribers() && self.last_used.elapsed() >= gc_time
    }

    fn publish(&self) {
        self.notify.send_replace(self.snapshot());
    }
}

struct Inner {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    options: CacheOptions,
}

/// Shared, deduplicating query cache
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl QueryCache {
    /// Cache whose entries stay fresh until invalidated
    pub fn new() -> Self {
        Self::with_options(CacheOptions::default())
    }

    /// Cache whose resolved entries are refetched once older than `stale_time`
    pub fn with_stale_time(stale_time: Duration) -> Self {
        Self::with_options(CacheOptions {
            stale_time: Some(stale_time),
            ..CacheOptions::default()
        })
    }

    /// Cache with explicit freshness and retention settings
    pub fn with_options(options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                options,
            }),
        }
    }

    pub fn options(&self) -> CacheOptions {
        self.inner.options
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-through fetch
    ///
    /// Serves fresh data from the cache, joins a running fetch for the same
    /// key, or starts one. The fetcher is remembered for background refetches.
    pub async fn read(&self, key: &CacheKey, fetcher: Fetcher) -> FetchResult {
        let mut rx = {
            let mut entries = self.entries();
            self.sweep(&mut entries);
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
            entry.fetcher = Some(fetcher.clone());
            entry.last_used = Instant::now();

            if let Some(in_flight) = &entry.in_flight {
                tracing::trace!("Joining in-flight fetch for {}", key);
                in_flight.rx.clone()
            } else if let Some(data) = entry.fresh_data(self.inner.options.stale_time) {
                tracing::trace!("Cache hit for {}", key);
                return Ok(data);
            } else {
                self.start_fetch(key, entry, fetcher)
            }
        };

        wait_for_outcome(&mut rx).await
    }

    fn start_fetch(
        &self,
        key: &CacheKey,
        entry: &mut Entry,
        fetcher: Fetcher,
    ) -> watch::Receiver<Option<FetchResult>> {
        entry.generation += 1;
        let generation = entry.generation;
        let (tx, rx) = watch::channel(None);
        entry.in_flight = Some(InFlight { rx: rx.clone() });
        entry.publish();

        tracing::debug!("Fetching {} (generation {})", key, generation);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let key = key.clone();
        tokio::spawn(async move {
            // A panicking fetcher must still settle the entry, or it stays pending
            let outcome = AssertUnwindSafe(async move { fetcher().await })
                .catch_unwind()
                .await;
            let result = match outcome {
                Ok(result) => result.map(Arc::new),
                Err(_) => {
                    tracing::error!("Fetcher for {} panicked", key);
                    Err(ApiError::network("fetch task panicked"))
                }
            };
            if let Some(inner) = weak.upgrade() {
                QueryCache { inner }.complete(&key, generation, &result);
            }
            // Waiters that went away are fine; the outcome is already stored
            let _ = tx.send(Some(result));
        });

        rx
    }

    fn complete(&self, key: &CacheKey, generation: u64, result: &FetchResult) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            tracing::debug!("Entry {} removed while fetching, dropping result", key);
            return;
        };

        if entry.generation != generation {
            tracing::debug!(
                "Discarding superseded fetch for {} (generation {}, current {})",
                key,
                generation,
                entry.generation
            );
            return;
        }

        entry.in_flight = None;
        entry.last_used = Instant::now();
        match result {
            Ok(data) => {
                entry.data = Some(data.clone());
                entry.error = None;
                entry.stale = false;
                entry.updated_at = Some(Instant::now());
            }
            Err(err) => {
                tracing::debug!("Fetch for {} failed: {}", key, err);
                entry.error = Some(err.clone());
            }
        }
        entry.publish();
    }

    fn invalidate_entry(&self, key: &CacheKey, entry: &mut Entry) {
        entry.stale = true;
        // Detach any running fetch; its result predates the invalidation
        entry.generation += 1;
        entry.in_flight = None;

        let refetch = entry
            .fetcher
            .clone()
            .filter(|_| entry.has_subscribers())
            .filter(|_| tokio::runtime::Handle::try_current().is_ok());

        match refetch {
            Some(fetcher) => {
                tracing::debug!("Revalidating {} in background", key);
                self.start_fetch(key, entry, fetcher);
            }
            None => entry.publish(),
        }
    }

    /// Mark one key stale; returns false if the key is unknown
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(entry) => {
                self.invalidate_entry(key, entry);
                true
            }
            None => false,
        }
    }

    /// Mark every key matching `predicate` stale; returns how many matched
    pub fn invalidate_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut entries = self.entries();
        let mut count = 0;
        for (key, entry) in entries.iter_mut().filter(|(k, _)| predicate(*k)) {
            self.invalidate_entry(key, entry);
            count += 1;
        }
        count
    }

    /// Mark every key of a resource stale
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let count = self.invalidate_where(|key| key.namespace() == namespace);
        tracing::debug!("Invalidated {} entries under {}", count, namespace);
        count
    }

    /// Mark every key whose serialized form starts with `prefix` stale
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_where(|key| key.matches_prefix(prefix))
    }

    pub fn invalidate_all(&self) -> usize {
        self.invalidate_where(|_| true)
    }

    /// Watch an entry; creates an idle entry for unknown keys
    ///
    /// An entry that is still idle when its last subscription is dropped is
    /// removed again.
    pub fn subscribe(&self, key: &CacheKey) -> QuerySubscription {
        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.last_used = Instant::now();
        QuerySubscription {
            key: key.clone(),
            rx: entry.notify.subscribe(),
            entry_id: entry.id,
            cache: Arc::downgrade(&self.inner),
        }
    }

    fn detach(&self, key: &CacheKey, entry_id: u64) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key).filter(|e| e.id == entry_id) else {
            return;
        };
        // The detaching receiver is still counted
        if entry.notify.receiver_count() > 1 {
            return;
        }
        if entry.status() == QueryStatus::Idle {
            entries.remove(key);
        } else {
            entry.last_used = Instant::now();
        }
    }

    /// Current snapshot of an entry without fetching
    pub fn peek(&self, key: &CacheKey) -> Option<QuerySnapshot> {
        self.entries().get(key).map(Entry::snapshot)
    }

    pub fn status(&self, key: &CacheKey) -> QueryStatus {
        self.peek(key).map_or(QueryStatus::Idle, |s| s.status)
    }

    /// Store a payload directly, superseding any running fetch
    pub fn set_data(&self, key: &CacheKey, value: Value) {
        let mut entries = self.entries();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.generation += 1;
        entry.in_flight = None;
        entry.data = Some(Arc::new(value));
        entry.error = None;
        entry.stale = false;
        entry.updated_at = Some(Instant::now());
        entry.last_used = Instant::now();
        entry.publish();
    }

    /// Mark a served payload as unusable
    ///
    /// The entry becomes errored (keeping its data for subscribers) and the
    /// next read refetches. Ignored when the entry has moved on to another
    /// payload since `data` was served.
    pub fn reject(&self, key: &CacheKey, data: &Arc<Value>, error: ApiError) -> bool {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        if !entry.data.as_ref().is_some_and(|d| Arc::ptr_eq(d, data)) {
            return false;
        }
        tracing::debug!("Rejecting cached payload for {}: {}", key, error);
        entry.error = Some(error);
        entry.publish();
        true
    }

    /// Evict entries past the gc window; returns how many were dropped
    pub fn gc(&self) -> usize {
        let mut entries = self.entries();
        self.sweep(&mut entries)
    }

    fn sweep(&self, entries: &mut HashMap<CacheKey, Entry>) -> usize {
        let gc_time = self.inner.options.gc_time;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_collectable(gc_time));
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} unused cache entries", evicted);
        }
        evicted
    }

    /// Drop an entry; its subscribers see their channel close
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

async fn wait_for_outcome(rx: &mut watch::Receiver<Option<FetchResult>>) -> FetchResult {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(result) = current {
            return result;
        }
        if rx.changed().await.is_err() {
            let last = rx.borrow().clone();
            return last.unwrap_or_else(|| {
                Err(ApiError::network("fetch task ended without a result"))
            });
        }
    }
}

/// Live view of one cache entry
///
/// Dropping the subscription detaches it. A fetch other callers wait on keeps
/// running.
pub struct QuerySubscription {
    key: CacheKey,
    rx: watch::Receiver<QuerySnapshot>,
    entry_id: u64,
    cache: Weak<Inner>,
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.cache.upgrade() {
            QueryCache { inner }.detach(&self.key, self.entry_id);
        }
    }
}

impl QuerySubscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> QuerySnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next change; `None` once the entry has been removed
    pub async fn changed(&mut self) -> Option<QuerySnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the entry settles on a value or an error
    pub async fn settled(&mut self) -> Option<QuerySnapshot> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if matches!(current.status, QueryStatus::Resolved | QueryStatus::Errored) {
                return Some(current);
            }
            self.rx.changed().await.ok()?;
        }
    }
}
