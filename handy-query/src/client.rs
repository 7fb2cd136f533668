//! Factory for query controllers sharing one cache.

use std::future::Future;
use std::sync::Arc;

use handy_core::{HandyResult, QuerySettings};
use handy_storage::CacheEngine;

use crate::controller::{QueryController, QueryValue};
use crate::options::QueryOptions;

/// Creates [`QueryController`]s that share one [`CacheEngine`] and the
/// configured default options.
#[derive(Debug, Clone)]
pub struct QueryClient {
    cache: Arc<CacheEngine>,
    defaults: QuerySettings,
}

impl QueryClient {
    pub fn new(cache: Arc<CacheEngine>, defaults: QuerySettings) -> Self {
        Self { cache, defaults }
    }

    pub fn cache(&self) -> &Arc<CacheEngine> {
        &self.cache
    }

    /// Options pre-filled with the configured defaults.
    pub fn options<T>(&self) -> QueryOptions<T> {
        QueryOptions::from_settings(&self.defaults)
    }

    /// Build a controller without fetching.
    pub fn query<T, F, Fut>(
        &self,
        key: impl Into<String>,
        query_fn: F,
        options: QueryOptions<T>,
    ) -> QueryController<T>
    where
        T: QueryValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandyResult<T>> + Send + 'static,
    {
        QueryController::new(key, query_fn, options, Arc::clone(&self.cache))
    }

    /// Build a controller and run its mount-time fetch.
    pub async fn run<T, F, Fut>(
        &self,
        key: impl Into<String>,
        query_fn: F,
        options: QueryOptions<T>,
    ) -> QueryController<T>
    where
        T: QueryValue,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandyResult<T>> + Send + 'static,
    {
        let controller = self.query(key, query_fn, options);
        // The outcome is recorded in the controller's state.
        let _ = controller.mount().await;
        controller
    }

    /// Drop every cached query whose key contains `pattern`.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        self.cache.invalidate_pattern(pattern).await
    }
}
