//! Writes and their effect on cached reads
//!
//! A [`Mutation`] runs a write operation, tracks its lifecycle in a
//! [`MutationEntry`] and, once the write succeeds, invalidates the queries
//! that depend on it. The mutation never touches query entries directly: the
//! refreshed data always comes from refetching the invalidated keys.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{watch, RwLock};
use tracing::{debug, field, info_span, warn, Instrument, Span};

use crate::error::Error;
use crate::errors::ConflictError;
use crate::key::KeyFilter;
use crate::query::QueryRunner;

/// Function performing the write
pub type MutationFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, Error>> + Send + Sync>;

type DependsFn<I, O> = Arc<dyn Fn(&I, &O) -> Vec<KeyFilter> + Send + Sync>;

/// Lifecycle status of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// State of the last invocation of a mutation
#[derive(Debug, Clone)]
pub struct MutationEntry<O> {
    pub status: MutationStatus,
    pub data: Option<O>,
    pub error: Option<Error>,
}

impl<O> MutationEntry<O> {
    fn with_status(status: MutationStatus) -> Self {
        Self {
            status,
            data: None,
            error: None,
        }
    }

    pub fn idle() -> Self {
        Self::with_status(MutationStatus::Idle)
    }

    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == MutationStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == MutationStatus::Error
    }
}

impl<O> Default for MutationEntry<O> {
    fn default() -> Self {
        Self::idle()
    }
}

/// Registry of the mutation identities currently pending
///
/// Every mutation created from the same registry shares it, so two runners
/// with the same identity exclude each other.
#[derive(Clone, Default)]
pub struct Identities(Arc<RwLock<HashMap<String, Arc<AtomicBool>>>>);

impl Identities {
    pub fn new() -> Self {
        Self::default()
    }

    async fn flag(&self, id: &str) -> Arc<AtomicBool> {
        if let Some(flag) = self.0.read().await.get(id) {
            return flag.clone();
        }
        self.0
            .write()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Mark the identity as pending, unless it already is
    async fn acquire(&self, id: &str) -> Option<Pending> {
        let flag = self.flag(id).await;
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Pending(flag))
    }

    /// The identity has a mutation in progress
    pub async fn is_pending(&self, id: &str) -> bool {
        self.0
            .read()
            .await
            .get(id)
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Releases the identity when dropped
struct Pending(Arc<AtomicBool>);

impl Drop for Pending {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A write operation bound to an identity
pub struct Mutation<I, O> {
    id: String,
    mutate: MutationFn<I, O>,
    depends: Option<DependsFn<I, O>>,
    queries: QueryRunner,
    identities: Identities,
    state: watch::Sender<MutationEntry<O>>,
}

impl<I, O> Mutation<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(
        id: impl Into<String>,
        queries: QueryRunner,
        identities: Identities,
        mutate: F,
    ) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, Error>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationEntry::idle());
        Self {
            id: id.into(),
            mutate: Arc::new(move |input| mutate(input).boxed()),
            depends: None,
            queries,
            identities,
            state,
        }
    }

    /// Declare the queries to invalidate after a successful write
    pub fn invalidates<F>(self, depends: F) -> Self
    where
        F: Fn(&I, &O) -> Vec<KeyFilter> + Send + Sync + 'static,
    {
        let mut mutation = self;
        mutation.depends = Some(Arc::new(depends));
        mutation
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// State of the last invocation
    pub fn entry(&self) -> MutationEntry<O> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationEntry<O>> {
        self.state.subscribe()
    }

    /// Back to idle
    pub fn reset(&self) {
        self.state.send_replace(MutationEntry::idle());
    }

    /// Run the write
    ///
    /// Fails with a conflict, leaving the entry untouched, if a mutation with
    /// the same identity is still pending. On success, every dependent key is
    /// invalidated (and refetched if observed) before returning. Failures do
    /// not invalidate anything.
    pub async fn run(&self, input: I) -> Result<O, Error> {
        let Some(_pending) = self.identities.acquire(&self.id).await else {
            warn!(id = %self.id, "mutation already in progress");
            return Err(ConflictError(self.id.clone()).into());
        };

        let span = info_span!("mutation", id = %self.id, return = field::Empty);
        async {
            let cur_span = Span::current();
            self.state
                .send_replace(MutationEntry::with_status(MutationStatus::Pending));

            let dependents = input.clone();
            match (self.mutate)(input).await {
                Ok(output) => {
                    self.state.send_replace(MutationEntry {
                        status: MutationStatus::Success,
                        data: Some(output.clone()),
                        error: None,
                    });
                    cur_span.record("return", "success");

                    let filters = self
                        .depends
                        .as_ref()
                        .map(|depends| depends(&dependents, &output))
                        .unwrap_or_default();
                    for filter in filters {
                        debug!(filter = %filter, "invalidating dependent queries");
                        self.queries.invalidate(filter).await;
                    }
                    Ok(output)
                }
                Err(err) => {
                    warn!("mutation failed: {err}");
                    self.state.send_replace(MutationEntry {
                        status: MutationStatus::Error,
                        data: None,
                        error: Some(err.clone()),
                    });
                    cur_span.record("return", "error");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, QueryStatus};
    use crate::error::ErrorKind;
    use crate::errors::ServerError;
    use crate::key::QueryKey;
    use crate::query::query_fn;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;
    use tokio_test::assert_ok;

    fn runner() -> QueryRunner {
        QueryRunner::new(Cache::default())
    }

    #[tokio::test]
    async fn it_tracks_a_successful_write() {
        let mutation = Mutation::new(
            "create-category",
            runner(),
            Identities::new(),
            |name: String| async move { Ok(format!("created {name}")) },
        );
        assert_eq!(mutation.entry().status, MutationStatus::Idle);

        let output = assert_ok!(mutation.run("rust".to_string()).await);
        assert_eq!(output, "created rust");

        let entry = mutation.entry();
        assert!(entry.is_success());
        assert_eq!(entry.data.as_deref(), Some("created rust"));
        assert!(entry.error.is_none());
    }

    #[tokio::test]
    async fn it_rejects_a_second_invocation_while_pending() {
        let identities = Identities::new();
        let (tx, rx) = oneshot::channel::<()>();
        let gate = Arc::new(tokio::sync::Mutex::new(Some(rx)));
        let mutation = Arc::new(Mutation::new(
            "create-post",
            runner(),
            identities.clone(),
            move |_: ()| {
                let gate = gate.clone();
                async move {
                    if let Some(rx) = gate.lock().await.take() {
                        let _ = rx.await;
                    }
                    Ok("post created")
                }
            },
        ));

        let first = tokio::spawn({
            let mutation = mutation.clone();
            async move { mutation.run(()).await }
        });
        tokio::task::yield_now().await;
        assert!(identities.is_pending("create-post").await);

        let second = mutation.run(()).await;
        assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);
        // the pending invocation is unaffected
        assert!(mutation.entry().is_pending());

        tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), "post created");
        assert!(mutation.entry().is_success());
        assert!(!identities.is_pending("create-post").await);

        // the identity is free again
        assert_ok!(mutation.run(()).await);
    }

    #[tokio::test]
    async fn it_shares_identities_between_runners() {
        let identities = Identities::new();
        let (tx, rx) = oneshot::channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));
        let slow = Mutation::new("follow", runner(), identities.clone(), move |_: ()| {
            let rx = rx.clone();
            async move {
                if let Some(rx) = rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok(())
            }
        });
        let other = Mutation::new("follow", runner(), identities.clone(), |_: ()| async { Ok(()) });

        let (first, second) = tokio::join!(slow.run(()), async {
            tokio::task::yield_now().await;
            let res = other.run(()).await;
            tx.send(()).unwrap();
            res
        });

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);
        assert_eq!(other.entry().status, MutationStatus::Idle);
    }

    #[tokio::test]
    async fn it_invalidates_dependent_queries_on_success() {
        let queries = runner();
        let key = QueryKey::new("posts").with("page", 1u32);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let calls = calls.clone();
            query_fn(move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                let posts = vec![json!({}); n + 1];
                async move { Ok(json!({ "posts": posts, "totalPages": 1 })) }
            })
        };
        let _observer = queries.cache().observe(&key, fetch.clone()).await;
        queries.run(&key, &fetch).await;

        let mutation = Mutation::new(
            "create-post",
            queries.clone(),
            Identities::new(),
            |_: ()| async { Ok(()) },
        )
        .invalidates(|_, _| vec![KeyFilter::family("posts")]);

        assert_ok!(mutation.run(()).await);

        let entry = queries.cache().get(&key).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(entry.select("/posts").and_then(|p| p.as_array()).map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn it_does_not_invalidate_on_failure() {
        let queries = runner();
        let key = QueryKey::new("profile");
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let calls = calls.clone();
            query_fn(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!({"user": {}})) }
            })
        };
        let _observer = queries.cache().observe(&key, fetch.clone()).await;
        queries.run(&key, &fetch).await;

        let mutation: Mutation<String, ()> =
            Mutation::new("follow", queries.clone(), Identities::new(), |_: String| async {
                Err(ServerError {
                    status: 400,
                    message: "You cannot follow yourself".into(),
                }
                .into())
            })
            .invalidates(|_, _| vec![QueryKey::new("profile").into()]);

        let err = mutation.run("u1".to_string()).await.unwrap_err();
        assert_eq!(err.message(), "You cannot follow yourself");

        let entry = mutation.entry();
        assert!(entry.is_error());
        assert!(entry.data.is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!queries.cache().get(&key).await.unwrap().is_stale);
    }

    #[tokio::test]
    async fn it_resets_on_each_invocation() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mutation = Mutation::new("likes", runner(), Identities::new(), {
            let attempts = attempts.clone();
            move |_: String| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(Error::from(ErrorKind::Network))
                    } else {
                        Ok("liked")
                    }
                }
            }
        });

        assert!(mutation.run("p1".into()).await.is_err());
        let mut rx = mutation.subscribe();
        assert!(rx.borrow_and_update().is_error());

        assert_ok!(mutation.run("p1".into()).await);
        let entry = rx.borrow_and_update().clone();
        assert!(entry.is_success());
        assert!(entry.error.is_none());

        mutation.reset();
        assert_eq!(mutation.entry().status, MutationStatus::Idle);
    }
}
