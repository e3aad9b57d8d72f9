//! Execution of reads against the cache
//!
//! A [`QueryRunner`] drives the fetch for a key and records the outcome in the
//! shared [`Cache`]. Two rules keep the cache consistent while the user keeps
//! interacting:
//!
//! - concurrent runs for the same key share one in-flight request;
//! - every request gets a sequence number, and a response only lands in the
//!   cache if it belongs to the latest request issued for its key.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use json_patch::{diff, Patch};
use serde_json::Value;
use tracing::{debug, field, info_span, trace, warn, Instrument, Span};

use crate::cache::{Cache, QueryEntry, QueryStatus};
use crate::error::Error;
use crate::key::{KeyFilter, QueryKey};

/// Function fetching the data for a key
pub type QueryFn = Arc<dyn Fn(QueryKey) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// Build a [`QueryFn`] from an async closure
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn(QueryKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Error>> + Send + 'static,
{
    Arc::new(move |key| f(key).boxed())
}

impl Cache {
    /// Start (or join) a fetch for the key and wait for its outcome
    ///
    /// When `force` is false and a request for the key is already in flight,
    /// the caller waits for that request instead of issuing a new one.
    pub(crate) async fn fetch(&self, key: &QueryKey, fetch: &QueryFn, force: bool) -> QueryEntry {
        let in_flight = {
            let mut store = self.store.write().await;
            let seq = store.next_seq();
            let slot = store.slot(key);

            match slot.in_flight.as_ref() {
                Some(in_flight) if !force => {
                    debug!(key = %key, "joining in-flight request");
                    in_flight.clone()
                }
                _ => {
                    slot.seq = seq;
                    slot.entry.status = QueryStatus::Loading;
                    self.publish(slot);

                    let request = self
                        .clone()
                        .request(key.clone(), seq, fetch.clone())
                        .boxed()
                        .shared();
                    slot.in_flight = Some(request.clone());
                    request
                }
            }
        };

        in_flight.await
    }

    async fn request(self, key: QueryKey, seq: u64, fetch: QueryFn) -> QueryEntry {
        let span = info_span!("query", key = %key, seq, return = field::Empty);
        async move {
            let result = fetch(key.clone()).await;
            self.apply(&key, seq, result).await
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, key: &QueryKey, seq: u64, result: Result<Value, Error>) -> QueryEntry {
        let cur_span = Span::current();
        let mut store = self.store.write().await;
        let Some(slot) = store.get_mut(key) else {
            // the cache was cleared while the request was in flight
            cur_span.record("return", "discarded");
            return QueryEntry::new(key.clone());
        };

        if slot.seq != seq {
            debug!(latest = slot.seq, "stale response discarded");
            cur_span.record("return", "discarded");
            return slot.entry.clone();
        }

        slot.in_flight = None;
        match result {
            Ok(data) => {
                if let Some(old) = slot.entry.data.as_ref() {
                    if tracing::enabled!(tracing::Level::TRACE) {
                        let Patch(changes) = diff(old, &data);
                        for change in changes {
                            trace!("- {}", change);
                        }
                    }
                }
                let entry = &mut slot.entry;
                entry.status = QueryStatus::Success;
                entry.data = Some(data);
                entry.error = None;
                entry.last_fetched_at = Some(Instant::now());
                entry.is_stale = false;
                cur_span.record("return", "success");
            }
            Err(err) => {
                warn!("query failed: {err}");
                // previous data stays visible
                let entry = &mut slot.entry;
                entry.status = QueryStatus::Error;
                entry.error = Some(err);
                cur_span.record("return", "error");
            }
        }

        self.publish(slot);
        slot.entry.clone()
    }
}

/// Runs reads and keeps their entries in the cache
#[derive(Clone)]
pub struct QueryRunner {
    cache: Cache,
    stale_time: Duration,
}

impl QueryRunner {
    pub fn new(cache: Cache) -> Self {
        Self {
            cache,
            stale_time: Duration::ZERO,
        }
    }

    /// How long a successful entry is served by [`ensure`](QueryRunner::ensure)
    /// without fetching again
    pub fn with_stale_time(self, stale_time: Duration) -> Self {
        let mut runner = self;
        runner.stale_time = stale_time;
        runner
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Fetch the key
    ///
    /// If a request for the key is already in flight, waits for it instead of
    /// issuing another one. Returns the entry as left by the request.
    pub async fn run(&self, key: &QueryKey, fetch: &QueryFn) -> QueryEntry {
        self.cache.fetch(key, fetch, false).await
    }

    /// Fetch the key even if a request is in flight
    ///
    /// The new request supersedes the previous one, whose response will be
    /// discarded.
    pub async fn refetch(&self, key: &QueryKey, fetch: &QueryFn) -> QueryEntry {
        self.cache.fetch(key, fetch, true).await
    }

    /// Serve the cached entry if it is still fresh, fetch otherwise
    pub async fn ensure(&self, key: &QueryKey, fetch: &QueryFn) -> QueryEntry {
        if let Some(entry) = self.cache.get(key).await {
            if entry.is_fresh(self.stale_time) {
                return entry;
            }
        }
        self.run(key, fetch).await
    }

    /// Invalidate the matching keys and refetch those being observed
    pub async fn invalidate(&self, filter: impl Into<KeyFilter>) -> Vec<QueryEntry> {
        self.cache.invalidate(filter).await
    }
}
