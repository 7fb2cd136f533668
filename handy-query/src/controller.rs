//! Per-key fetch orchestration.
//!
//! A [`QueryController`] owns one query function and one observable
//! [`QueryState`]. Every fetch consults the shared [`CacheEngine`] first and
//! only calls the query function when the cache has nothing fresh. Failures
//! are surfaced as state and never retried automatically.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use handy_core::clock::elapsed_between;
use handy_core::{Clock, HandyError, HandyResult, QueryError, Timestamp};
use handy_storage::CacheEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::options::QueryOptions;
use crate::state::QueryState;

/// Stored query function. Called once per fetch.
pub type QueryFn<T> = Arc<dyn Fn() -> BoxFuture<'static, HandyResult<T>> + Send + Sync>;

/// Values a query can produce.
pub trait QueryValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> QueryValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Fetch orchestration and state for one query key.
pub struct QueryController<T> {
    key: String,
    query_fn: QueryFn<T>,
    options: QueryOptions<T>,
    cache: Arc<CacheEngine>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<QueryState<T>>,
    active: AtomicBool,
}

impl<T: QueryValue> QueryController<T> {
    pub fn new<F, Fut>(
        key: impl Into<String>,
        query_fn: F,
        options: QueryOptions<T>,
        cache: Arc<CacheEngine>,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandyResult<T>> + Send + 'static,
    {
        let query_fn: QueryFn<T> = Arc::new(move || query_fn().boxed());
        let (state, _) = watch::channel(QueryState::initial(options.enabled));
        Self {
            key: key.into(),
            query_fn,
            clock: cache.clock(),
            options,
            cache,
            state,
            active: AtomicBool::new(true),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn options(&self) -> &QueryOptions<T> {
        &self.options
    }

    /// Current state snapshot.
    pub fn state(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.state.subscribe()
    }

    pub fn data(&self) -> Option<T> {
        self.state.borrow().data.clone()
    }

    /// Whether the data is older than the stale time (or was never fetched).
    pub fn is_stale(&self) -> bool {
        self.state
            .borrow()
            .is_stale(self.clock.now(), self.options.stale_time)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark the consumer as gone. Fetches that finish afterwards leave the
    /// state alone and fire no callbacks.
    pub fn detach(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Mount-time fetch: runs when the query is enabled and either
    /// `refetch_on_mount` is set or there is no data yet. Returns `None` when
    /// nothing ran.
    pub async fn mount(&self) -> Option<HandyResult<T>> {
        let has_data = self.state.borrow().data.is_some();
        if self.options.enabled && (self.options.refetch_on_mount || !has_data) {
            Some(self.refetch().await)
        } else {
            None
        }
    }

    /// Serve fresh cached data, or call the query function.
    ///
    /// On success the value is stored, written to the cache for the stale
    /// time and passed to `on_success`. On failure the error is stored and
    /// passed to `on_error`. Either way `loading` ends false.
    pub async fn refetch(&self) -> HandyResult<T> {
        if !self.options.enabled {
            return Err(QueryError::Disabled {
                key: self.key.clone(),
            }
            .into());
        }
        if !self.is_active() {
            return Err(QueryError::Detached {
                key: self.key.clone(),
            }
            .into());
        }

        self.update(|state| {
            state.loading = true;
            state.error = None;
        });

        if let Some(value) = self.fresh_from_cache().await {
            return Ok(value);
        }

        match (self.query_fn)().await {
            Ok(value) => {
                self.on_fetched(&value).await;
                Ok(value)
            }
            Err(error) => {
                self.on_failed(&error);
                Err(error)
            }
        }
    }

    /// Drop this query's cache entry so the next fetch calls the query
    /// function.
    pub async fn invalidate(&self) {
        self.cache.delete(&self.key).await;
    }

    async fn fresh_from_cache(&self) -> Option<T> {
        let cached = self.cache.read::<T>(&self.key).await?;
        let own = self.state.borrow().last_fetched_at;
        let fetched_at: Timestamp = match own {
            Some(own) => own.max(cached.written_at()),
            None => cached.written_at(),
        };

        if elapsed_between(fetched_at, self.clock.now()) > self.options.stale_time {
            debug!(key = %self.key, "Cached query data is stale");
            return None;
        }

        let value = cached.into_value();
        debug!(key = %self.key, "Query served from cache");
        self.update(|state| {
            state.data = Some(value.clone());
            state.last_fetched_at = Some(fetched_at);
            state.loading = false;
        });
        Some(value)
    }

    async fn on_fetched(&self, value: &T) {
        let now = self.clock.now();
        self.update(|state| {
            state.data = Some(value.clone());
            state.last_fetched_at = Some(now);
            state.loading = false;
        });

        // A zero stale time means "always stale"; there is nothing worth caching.
        if !self.options.stale_time.is_zero() {
            if let Err(e) = self.cache.set(&self.key, value, self.options.stale_time).await {
                warn!(key = %self.key, error = %e, "Query result not cached");
            }
        }

        if self.is_active() {
            if let Some(callback) = &self.options.on_success {
                callback(value);
            }
        }
    }

    fn on_failed(&self, error: &HandyError) {
        warn!(key = %self.key, error = %error, "Query failed");
        self.update(|state| {
            state.error = Some(error.clone());
            state.loading = false;
        });
        if self.is_active() {
            if let Some(callback) = &self.options.on_error {
                callback(error);
            }
        }
    }

    fn update(&self, modify: impl FnOnce(&mut QueryState<T>)) {
        if self.is_active() {
            self.state.send_modify(modify);
        }
    }
}

impl<T> std::fmt::Debug for QueryController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryController")
            .field("key", &self.key)
            .field("options", &self.options)
            .field("active", &self.active.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handy_core::DocumentError;
    use handy_storage::{CacheConfig, MemoryKeyValueStore};
    use handy_test_utils::ManualClock;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn cache_with_clock() -> (Arc<CacheEngine>, ManualClock) {
        let clock = ManualClock::default();
        let cache = CacheEngine::new(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(clock.clone()),
            CacheConfig::default(),
        );
        (Arc::new(cache), clock)
    }

    fn counting_query(calls: Arc<AtomicUsize>) -> impl Fn() -> BoxFuture<'static, HandyResult<u32>> {
        move || {
            let calls = Arc::clone(&calls);
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_initial_state_is_loading() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller =
            QueryController::new("k", counting_query(calls), QueryOptions::default(), cache);
        let state = controller.state();
        assert!(state.loading);
        assert!(state.data.is_none());
        assert!(controller.is_stale());
    }

    #[tokio::test]
    async fn test_refetch_success_updates_state() {
        let (cache, clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = QueryController::new(
            "k",
            counting_query(Arc::clone(&calls)),
            QueryOptions::default(),
            Arc::clone(&cache),
        );

        let value = controller.refetch().await.expect("fetch should succeed");
        assert_eq!(value, 1);
        let state = controller.state();
        assert_eq!(state.data, Some(1));
        assert!(!state.loading);
        assert_eq!(state.last_fetched_at, Some(clock.now()));
        assert_eq!(cache.get::<u32>("k").await, Some(1));
        assert!(!controller.is_stale());
    }

    #[tokio::test]
    async fn test_zero_stale_time_skips_cache() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = QueryController::new(
            "k",
            counting_query(Arc::clone(&calls)),
            QueryOptions::default().stale_time(Duration::ZERO),
            Arc::clone(&cache),
        );

        controller.refetch().await.expect("fetch should succeed");
        controller.refetch().await.expect("fetch should succeed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.memory_len(), 0);
    }

    #[tokio::test]
    async fn test_failure_sets_error_and_clears_on_next_attempt() {
        let (cache, _clock) = cache_with_clock();
        let fail = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&fail);
        let controller = QueryController::new(
            "services_list",
            move || {
                let fail = flag.load(Ordering::SeqCst);
                async move {
                    if fail {
                        Err(HandyError::from(DocumentError::Transport {
                            reason: "offline".to_string(),
                        }))
                    } else {
                        Ok(vec!["plumbing".to_string()])
                    }
                }
            },
            QueryOptions::default(),
            cache,
        );

        let err = controller.refetch().await.expect_err("first fetch fails");
        assert!(matches!(err, HandyError::Document(DocumentError::Transport { .. })));
        let state = controller.state();
        assert_eq!(state.error, Some(err));
        assert!(!state.loading);
        assert!(state.data.is_none());

        fail.store(false, Ordering::SeqCst);
        let mut updates = controller.subscribe();
        controller.refetch().await.expect("retry succeeds");
        assert!(updates.has_changed().expect("sender alive"));
        let state = updates.borrow_and_update().clone();
        assert_eq!(state.error, None);
        assert_eq!(state.data, Some(vec!["plumbing".to_string()]));
    }

    #[tokio::test]
    async fn test_disabled_query_never_fetches() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = QueryController::new(
            "k",
            counting_query(Arc::clone(&calls)),
            QueryOptions::default().enabled(false),
            cache,
        );

        assert!(controller.mount().await.is_none());
        let err = controller.refetch().await.expect_err("disabled");
        assert_eq!(
            err,
            HandyError::Query(QueryError::Disabled {
                key: "k".to_string()
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!controller.state().loading);
    }

    #[tokio::test]
    async fn test_mount_without_refetch_on_mount_only_fetches_once() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = QueryController::new(
            "k",
            counting_query(Arc::clone(&calls)),
            QueryOptions::default()
                .refetch_on_mount(false)
                .stale_time(Duration::ZERO),
            cache,
        );

        assert!(controller.mount().await.is_some());
        assert!(controller.mount().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_query_fn() {
        let (cache, _clock) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = QueryController::new(
            "k",
            counting_query(Arc::clone(&calls)),
            QueryOptions::default(),
            cache,
        );

        controller.refetch().await.expect("fetch");
        controller.refetch().await.expect("cache hit");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        controller.invalidate().await;
        assert_eq!(controller.refetch().await.expect("fetch"), 2);
    }
}
