//! Tag-indexed cache of read results.
//!
//! Each key has at most one fetch in flight. Fetches run in spawned tasks
//! and write their result into the cache themselves, so a reader that
//! stops waiting never leaves an entry half-updated.
//!
//! Invalidation marks matching entries stale. An entry that is mid-fetch
//! records the invalidation and its result lands stale, which makes the
//! readers waiting on it fetch again; a read that starts after a mutation
//! has resolved therefore never sees pre-mutation data.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::query::Query;
use super::tag::{intersects, Tag};
use crate::config::CacheConfig;
use crate::error::{panic_message, ApiError, ApiResult, TransportKind};

type FetchFuture = Shared<BoxFuture<'static, ApiResult<Value>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Fetching,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub payload: Option<Value>,
    pub tags: Vec<Tag>,
    pub freshness: Freshness,
    pub subscribers: usize,
}

struct Entry {
    query: Query,
    payload: Option<Value>,
    tags: Vec<Tag>,
    freshness: Freshness,
    in_flight: Option<FetchFuture>,
    fetch_id: u64,
    /// Tags invalidated while the current fetch was running
    pending: Vec<Tag>,
    subscribers: usize,
    last_used: Instant,
    /// An eviction timer is running for this entry
    eviction_pending: bool,
    updates: watch::Sender<u64>,
}

impl Entry {
    fn new(query: &Query) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            query: query.clone(),
            payload: None,
            tags: query.static_tags(),
            freshness: Freshness::Stale,
            in_flight: None,
            fetch_id: 0,
            pending: Vec::new(),
            subscribers: 0,
            last_used: Instant::now(),
            eviction_pending: false,
            updates,
        }
    }

    fn notify(&self) {
        self.updates.send_modify(|version| *version += 1);
    }

    fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            payload: self.payload.clone(),
            tags: self.tags.clone(),
            freshness: self.freshness,
            subscribers: self.subscribers,
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_fetch: u64,
}

/// Shared resource cache. Clones share entries.
#[derive(Clone)]
pub struct TaggedCache {
    inner: Arc<Mutex<Inner>>,
    config: CacheConfig,
}

impl TaggedCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached value for the query, fetching it if absent or stale.
    ///
    /// Concurrent reads of one key share a single fetch. Fetch errors are
    /// returned, not cached.
    pub async fn read(&self, query: &Query) -> ApiResult<Value> {
        loop {
            let fetch = {
                let mut inner = self.lock();
                let inner = &mut *inner;
                let entry = inner
                    .entries
                    .entry(query.key().to_string())
                    .or_insert_with(|| Entry::new(query));
                entry.query = query.clone();
                entry.last_used = Instant::now();

                match entry.freshness {
                    Freshness::Fresh => {
                        if let Some(payload) = entry.payload.clone() {
                            if entry.subscribers == 0 {
                                self.schedule_eviction(query.key(), entry);
                            }
                            return Ok(payload);
                        }
                        self.start_fetch(query.key(), entry, &mut inner.next_fetch)
                    }
                    Freshness::Fetching => match entry.in_flight.clone() {
                        Some(fetch) => fetch,
                        None => self.start_fetch(query.key(), entry, &mut inner.next_fetch),
                    },
                    Freshness::Stale => {
                        self.start_fetch(query.key(), entry, &mut inner.next_fetch)
                    }
                }
            };

            let value = fetch.await?;

            let inner = self.lock();
            match inner.entries.get(query.key()) {
                // Evicted or reset while fetching; the result is still ours.
                None => return Ok(value),
                Some(entry) if entry.freshness == Freshness::Fresh => {
                    if let Some(payload) = entry.payload.clone() {
                        return Ok(payload);
                    }
                }
                Some(_) => {
                    debug!(key = query.key(), "Result landed stale, fetching again");
                }
            }
        }
    }

    /// [`read`](Self::read) and deserialize.
    pub async fn read_as<T: DeserializeOwned>(&self, query: &Query) -> ApiResult<T> {
        let value = self.read(query).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::transport(TransportKind::MalformedResponse, e.to_string()))
    }

    /// Run a mutation and, if it succeeds, invalidate `invalidates` before
    /// returning its result.
    pub async fn mutate<F, T>(&self, mutation: F, invalidates: &[Tag]) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let result = mutation.await?;
        self.invalidate(invalidates);
        Ok(result)
    }

    /// Mark every entry providing a matching tag stale. Entries with
    /// subscribers are refetched in the background.
    ///
    /// Returns the number of entries affected.
    pub fn invalidate(&self, tags: &[Tag]) -> usize {
        if tags.is_empty() {
            return 0;
        }
        let mut inner = self.lock();
        let inner = &mut *inner;
        let mut affected = 0;

        for (key, entry) in inner.entries.iter_mut() {
            if entry.freshness == Freshness::Fetching {
                entry.pending.extend(tags.iter().cloned());
                if intersects(tags, &entry.tags) {
                    affected += 1;
                }
                continue;
            }
            if !intersects(tags, &entry.tags) {
                continue;
            }
            affected += 1;
            entry.freshness = Freshness::Stale;
            entry.notify();
            if entry.subscribers > 0 {
                debug!(key = %key, "Refetching invalidated entry");
                let _ = self.start_fetch(key, entry, &mut inner.next_fetch);
            }
        }

        debug!(
            tags = %tags.iter().map(Tag::to_string).collect::<Vec<_>>().join(","),
            affected,
            "Invalidated tags"
        );
        affected
    }

    /// Register interest in a query. Starts a fetch if there is no fresh
    /// value. Must be called within a Tokio runtime.
    pub fn subscribe(&self, query: &Query) -> Subscription {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let entry = inner
            .entries
            .entry(query.key().to_string())
            .or_insert_with(|| Entry::new(query));
        entry.query = query.clone();
        entry.subscribers += 1;
        entry.last_used = Instant::now();
        let updates = entry.updates.subscribe();
        if entry.freshness == Freshness::Stale {
            let _ = self.start_fetch(query.key(), entry, &mut inner.next_fetch);
        }

        Subscription {
            cache: self.clone(),
            query: query.clone(),
            updates,
            active: true,
        }
    }

    /// Drop one subscriber of `key`. The entry is retained for
    /// `keep_unused_for` once nobody is subscribed.
    pub fn unsubscribe(&self, key: &str) {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(key) else {
            return;
        };
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            entry.last_used = Instant::now();
            self.schedule_eviction(key, entry);
        }
    }

    pub fn snapshot(&self, key: &str) -> Option<EntrySnapshot> {
        self.lock().entries.get(key).map(Entry::snapshot)
    }

    /// Drop every entry. Results of fetches still running are discarded.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        info!(dropped, "Cache reset");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start_fetch(&self, key: &str, entry: &mut Entry, next_fetch: &mut u64) -> FetchFuture {
        *next_fetch += 1;
        let fetch_id = *next_fetch;
        entry.fetch_id = fetch_id;
        entry.freshness = Freshness::Fetching;
        entry.pending.clear();

        let query = entry.query.clone();
        let cache = self.clone();
        let owned_key = key.to_string();
        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(async move { query.fetch().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(ApiError::transport(
                    TransportKind::Other,
                    format!("fetch panicked: {}", panic_message(&*panic)),
                )),
            };
            cache.complete(&owned_key, fetch_id, &result);
            result
        });
        let cache = self.clone();
        let owned_key = key.to_string();
        let shared = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let result = Err(ApiError::transport(TransportKind::Other, e.to_string()));
                    cache.complete(&owned_key, fetch_id, &result);
                    result
                }
            }
        }
        .boxed()
        .shared();

        entry.in_flight = Some(shared.clone());
        entry.notify();
        shared
    }

    fn complete(&self, key: &str, fetch_id: u64, result: &ApiResult<Value>) {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let Some(entry) = inner.entries.get_mut(key) else {
            debug!(key, "Discarding result for dropped entry");
            return;
        };
        if entry.fetch_id != fetch_id {
            debug!(key, "Discarding result of superseded fetch");
            return;
        }

        entry.in_flight = None;
        let mut refetch = false;
        match result {
            Ok(value) => {
                let tags = entry.query.tags_for(value);
                let stale =
                    intersects(&entry.pending, &entry.tags) || intersects(&entry.pending, &tags);
                entry.payload = Some(value.clone());
                entry.tags = tags;
                entry.freshness = if stale {
                    Freshness::Stale
                } else {
                    Freshness::Fresh
                };
                refetch = stale && entry.subscribers > 0;
            }
            Err(e) => {
                warn!(key, code = e.error_code(), "Fetch failed: {}", e);
                entry.freshness = Freshness::Stale;
            }
        }
        entry.pending.clear();
        entry.last_used = Instant::now();
        entry.notify();

        if refetch {
            let _ = self.start_fetch(key, entry, &mut inner.next_fetch);
        } else if entry.subscribers == 0 {
            self.schedule_eviction(key, entry);
        }
    }

    /// Evict `key` once it has gone unused for the retention period. At
    /// most one timer runs per entry; it re-arms while the entry keeps
    /// being read.
    fn schedule_eviction(&self, key: &str, entry: &mut Entry) {
        if entry.eviction_pending {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        entry.eviction_pending = true;
        let mut deadline = entry.last_used + self.config.keep_unused_for;
        let cache = self.clone();
        let key = key.to_string();
        runtime.spawn(async move {
            loop {
                tokio::time::sleep_until(deadline).await;
                match cache.evict_if_idle(&key) {
                    Some(next) => deadline = next,
                    None => break,
                }
            }
        });
    }

    /// Remove `key` if it is idle past retention. Returns the new deadline
    /// when it was used in the meantime.
    fn evict_if_idle(&self, key: &str) -> Option<Instant> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(key)?;
        if entry.subscribers > 0 || entry.in_flight.is_some() {
            entry.eviction_pending = false;
            return None;
        }
        let deadline = entry.last_used + self.config.keep_unused_for;
        if deadline > Instant::now() {
            return Some(deadline);
        }
        inner.entries.remove(key);
        debug!(key, "Evicted unused entry");
        None
    }
}

impl Default for TaggedCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Active interest in one query. Unsubscribes on drop.
pub struct Subscription {
    cache: TaggedCache,
    query: Query,
    updates: watch::Receiver<u64>,
    active: bool,
}

impl Subscription {
    pub fn key(&self) -> &str {
        self.query.key()
    }

    /// Wait until the entry changes. Returns `false` once the entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.updates.changed().await.is_ok()
    }

    /// Current cached payload without fetching.
    pub fn snapshot(&self) -> Option<Value> {
        self.cache.snapshot(self.key()).and_then(|s| s.payload)
    }

    pub fn freshness(&self) -> Option<Freshness> {
        self.cache.snapshot(self.key()).map(|s| s.freshness)
    }

    /// Read through the cache.
    pub async fn read(&self) -> ApiResult<Value> {
        self.cache.read(&self.query).await
    }

    /// Unsubscribe now instead of on drop.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.cache.unsubscribe(self.query.key());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
