//! Keyed store of fetched server resources
//!
//! The cache holds one [`QueryEntry`] per [`QueryKey`]. Entries are only ever
//! written by the query runner (see [`crate::query`]); views read them through
//! [`Cache::get`], or follow them with [`Cache::subscribe`].
//!
//! Invalidation never deletes data. An invalidated entry keeps showing its
//! last data, flagged as stale, until the refetch triggered by the
//! invalidation completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use jsonptr::Pointer;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::error::Error;
use crate::key::{KeyFilter, QueryKey};
use crate::query::QueryFn;

/// Lifecycle status of a query entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Cached state of a single read
#[derive(Debug, Clone)]
pub struct QueryEntry {
    pub key: QueryKey,
    pub status: QueryStatus,
    /// Last successfully fetched data
    ///
    /// Kept while a refetch is loading and when a refetch fails.
    pub data: Option<Value>,
    pub error: Option<Error>,
    pub last_fetched_at: Option<Instant>,
    /// The entry was invalidated and has not been refetched since
    pub is_stale: bool,
}

impl QueryEntry {
    pub fn new(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
            is_stale: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Parse the data into a typed record
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
        match self.data.as_ref() {
            Some(data) => Ok(Some(T::deserialize(data)?)),
            None => Ok(None),
        }
    }

    /// Resolve a JSON pointer (e.g. `/postFound/likes`) within the data
    pub fn select(&self, pointer: &str) -> Option<&Value> {
        let pointer = Pointer::parse(pointer).ok()?;
        let data = self.data.as_ref()?;
        pointer.resolve(data).ok()
    }

    /// The data can be served without a new fetch
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        self.is_success()
            && !self.is_stale
            && self
                .last_fetched_at
                .is_some_and(|at| at.elapsed() < stale_time)
    }
}

/// Status transition of a cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub is_stale: bool,
}

pub(crate) type InFlight = Shared<BoxFuture<'static, QueryEntry>>;

pub(crate) struct Slot {
    pub(crate) entry: QueryEntry,
    /// Sequence number of the latest request issued for the key
    pub(crate) seq: u64,
    pub(crate) in_flight: Option<InFlight>,
    fetch: Option<QueryFn>,
    observers: Arc<AtomicUsize>,
    tx: watch::Sender<QueryEntry>,
}

impl Slot {
    fn new(key: QueryKey) -> Self {
        let entry = QueryEntry::new(key);
        let (tx, _) = watch::channel(entry.clone());
        Self {
            entry,
            seq: 0,
            in_flight: None,
            fetch: None,
            observers: Arc::new(AtomicUsize::new(0)),
            tx,
        }
    }

    fn is_observed(&self) -> bool {
        self.observers.load(Ordering::SeqCst) > 0
    }
}

#[derive(Default)]
pub(crate) struct Store {
    slots: HashMap<QueryKey, Slot>,
    // never reset, so a response issued before a clear cannot match
    // a slot created after it
    last_seq: u64,
}

impl Store {
    pub(crate) fn slot(&mut self, key: &QueryKey) -> &mut Slot {
        self.slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone()))
    }

    pub(crate) fn get_mut(&mut self, key: &QueryKey) -> Option<&mut Slot> {
        self.slots.get_mut(key)
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }
}

/// Shared store of query entries
///
/// Cloning a cache gives another handle to the same store.
#[derive(Clone)]
pub struct Cache {
    pub(crate) store: Arc<RwLock<Store>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Cache {
    /// Create an empty cache
    ///
    /// `capacity` is the number of events buffered for each
    /// [`events`](Cache::events) receiver.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            events,
        }
    }

    /// Current entry for the key, if the key was ever referenced
    pub async fn get(&self, key: &QueryKey) -> Option<QueryEntry> {
        let store = self.store.read().await;
        store.slots.get(key).map(|slot| slot.entry.clone())
    }

    pub(crate) async fn set(&self, entry: QueryEntry) {
        let mut store = self.store.write().await;
        let slot = store.slot(&entry.key);
        slot.entry = entry;
        self.publish(slot);
    }

    /// Follow every change of the entry for the key
    ///
    /// The entry is created (idle) if the key was never referenced.
    pub async fn subscribe(&self, key: &QueryKey) -> watch::Receiver<QueryEntry> {
        let mut store = self.store.write().await;
        store.slot(key).tx.subscribe()
    }

    /// Like [`subscribe`](Cache::subscribe), as a stream
    pub async fn subscribe_stream(&self, key: &QueryKey) -> WatchStream<QueryEntry> {
        WatchStream::new(self.subscribe(key).await)
    }

    /// Receive every status transition of every key, in order
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Register interest in a key
    ///
    /// `fetch` is kept with the entry and used to refetch the key when it gets
    /// invalidated. The key counts as observed until the returned guard is
    /// dropped.
    pub async fn observe(&self, key: &QueryKey, fetch: QueryFn) -> Observer {
        let mut store = self.store.write().await;
        let slot = store.slot(key);
        slot.fetch = Some(fetch);
        slot.observers.fetch_add(1, Ordering::SeqCst);
        Observer {
            key: key.clone(),
            count: slot.observers.clone(),
        }
    }

    /// Number of live observers for the key
    pub async fn observers(&self, key: &QueryKey) -> usize {
        let store = self.store.read().await;
        store
            .slots
            .get(key)
            .map(|slot| slot.observers.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Mark every matching entry as stale
    ///
    /// Returns the observed keys that need a refetch, together with the fetch
    /// function registered for them, sorted by key. Each key appears once no
    /// matter how many views observe it.
    pub(crate) async fn mark_stale(&self, filter: &KeyFilter) -> Vec<(QueryKey, QueryFn)> {
        let mut store = self.store.write().await;
        let mut scheduled = Vec::new();
        for (key, slot) in store.slots.iter_mut().filter(|(k, _)| filter.matches(k)) {
            slot.entry.is_stale = true;
            self.publish(slot);
            if !slot.is_observed() {
                continue;
            }
            if let Some(fetch) = slot.fetch.as_ref() {
                scheduled.push((key.clone(), fetch.clone()));
            }
        }
        scheduled.sort_by(|(a, _), (b, _)| a.cmp(b));
        debug!(filter = %filter, refetch = scheduled.len(), "invalidated");
        scheduled
    }

    /// Invalidate the matching entries and refetch the observed ones
    ///
    /// Refetches run one after the other. The refreshed entries are returned
    /// in key order.
    pub async fn invalidate(&self, filter: impl Into<KeyFilter>) -> Vec<QueryEntry> {
        let filter = filter.into();
        let scheduled = self.mark_stale(&filter).await;
        let mut refreshed = Vec::with_capacity(scheduled.len());
        for (key, fetch) in scheduled {
            refreshed.push(self.fetch(&key, &fetch, true).await);
        }
        refreshed
    }

    /// Remove every entry
    ///
    /// Keys still observed by a view go back to idle but keep their observers
    /// and fetch function, so later invalidations refetch them. Responses
    /// still in flight are discarded when they arrive.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        store.slots.retain(|_, slot| slot.is_observed());
        for slot in store.slots.values_mut() {
            // sequence numbers start at 1, so no pending response matches
            slot.seq = 0;
            slot.in_flight = None;
            slot.entry = QueryEntry::new(slot.entry.key.clone());
            self.publish(slot);
        }
        debug!(observed = store.slots.len(), "cache cleared");
    }

    pub(crate) fn publish(&self, slot: &Slot) {
        slot.tx.send_replace(slot.entry.clone());
        // nobody listening is fine
        let _ = self.events.send(CacheEvent {
            key: slot.entry.key.clone(),
            status: slot.entry.status,
            is_stale: slot.entry.is_stale,
        });
    }
}

/// Interest of a view in a key
///
/// The key stops being observed when the guard is dropped.
#[derive(Debug)]
pub struct Observer {
    key: QueryKey,
    count: Arc<AtomicUsize>,
}

impl Observer {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::query_fn;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn success(key: &QueryKey, data: Value) -> QueryEntry {
        QueryEntry {
            status: QueryStatus::Success,
            data: Some(data),
            last_fetched_at: Some(Instant::now()),
            ..QueryEntry::new(key.clone())
        }
    }

    #[tokio::test]
    async fn it_returns_nothing_for_unknown_keys() {
        let cache = Cache::default();
        assert!(cache.get(&QueryKey::new("posts")).await.is_none());
    }

    #[tokio::test]
    async fn it_keeps_data_when_marking_stale() {
        let cache = Cache::default();
        let key = QueryKey::new("categories");
        cache.set(success(&key, json!({"categories": []}))).await;

        let scheduled = cache.mark_stale(&KeyFilter::from(key.clone())).await;
        // nobody observes the key
        assert!(scheduled.is_empty());

        let entry = cache.get(&key).await.unwrap();
        assert!(entry.is_stale);
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(entry.data, Some(json!({"categories": []})));
    }

    #[tokio::test]
    async fn it_schedules_observed_keys_once() {
        let cache = Cache::default();
        let fetch = query_fn(|_| async { Ok(json!(null)) });
        let page1 = QueryKey::new("posts").with("page", 1u32);
        let page2 = QueryKey::new("posts").with("page", 2u32);
        let profile = QueryKey::new("profile");

        let _a = cache.observe(&page1, fetch.clone()).await;
        let _b = cache.observe(&page1, fetch.clone()).await;
        let _c = cache.observe(&profile, fetch.clone()).await;
        {
            let _d = cache.observe(&page2, fetch.clone()).await;
        }
        assert_eq!(cache.observers(&page1).await, 2);
        assert_eq!(cache.observers(&page2).await, 0);

        let scheduled = cache.mark_stale(&KeyFilter::family("posts")).await;
        let keys: Vec<QueryKey> = scheduled.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![page1]);

        // page2 is no longer observed but still marked
        assert!(cache.get(&page2).await.unwrap().is_stale);
        assert!(!cache.get(&profile).await.unwrap().is_stale);
    }

    #[tokio::test]
    async fn it_notifies_subscribers() {
        let cache = Cache::default();
        let key = QueryKey::new("profile");
        let mut rx = cache.subscribe(&key).await;
        assert_eq!(rx.borrow().status, QueryStatus::Idle);

        cache.set(success(&key, json!({"user": {"_id": "u1"}}))).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, QueryStatus::Success);
    }

    #[tokio::test]
    async fn it_selects_values_by_pointer() {
        let key = QueryKey::new("posts");
        let entry = success(&key, json!({"posts": [{"_id": "p1"}], "totalPages": 3}));
        assert_eq!(entry.select("/totalPages"), Some(&json!(3)));
        assert_eq!(entry.select("/posts/0/_id"), Some(&json!("p1")));
        assert_eq!(entry.select("/missing"), None);
        assert_eq!(entry.select("not-a-pointer"), None);
    }

    #[test]
    fn it_considers_only_recent_successes_fresh() {
        let key = QueryKey::new("posts");
        let mut entry = success(&key, json!([]));
        assert!(entry.is_fresh(Duration::from_secs(60)));
        assert!(!entry.is_fresh(Duration::ZERO));

        entry.is_stale = true;
        assert!(!entry.is_fresh(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn it_forgets_everything_on_clear() {
        let cache = Cache::default();
        let key = QueryKey::new("notifications");
        cache.set(success(&key, json!([]))).await;
        cache.clear().await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn it_keeps_observed_keys_idle_on_clear() {
        let cache = Cache::default();
        let fetch = query_fn(|_| async { Ok(json!({"posts": []})) });
        let key = QueryKey::new("posts").with("page", 1u32);
        let _observer = cache.observe(&key, fetch).await;
        cache.set(success(&key, json!({"posts": [{"_id": "p1"}]}))).await;

        cache.clear().await;

        let entry = cache.get(&key).await.unwrap();
        assert_eq!(entry.status, QueryStatus::Idle);
        assert_eq!(entry.data, None);
        assert_eq!(cache.observers(&key).await, 1);

        let scheduled = cache.mark_stale(&KeyFilter::family("posts")).await;
        assert_eq!(scheduled.len(), 1);
    }
}
