//! Per-query options.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use handy_core::{HandyError, QuerySettings};

/// Default staleness window: five minutes.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&HandyError) + Send + Sync>;

/// Options for a single query.
pub struct QueryOptions<T> {
    /// When false the query never fetches.
    pub enabled: bool,
    /// Fetch on mount even when data is already present.
    pub refetch_on_mount: bool,
    /// How long fetched data stays fresh. Also the TTL of the cache entry.
    pub stale_time: Duration,
    pub(crate) on_success: Option<SuccessCallback<T>>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_on_mount: true,
            stale_time: DEFAULT_STALE_TIME,
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            refetch_on_mount: self.refetch_on_mount,
            stale_time: self.stale_time,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("enabled", &self.enabled)
            .field("refetch_on_mount", &self.refetch_on_mount)
            .field("stale_time", &self.stale_time)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<T> QueryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults taken from the `[query]` config section.
    pub fn from_settings(settings: &QuerySettings) -> Self {
        Self {
            refetch_on_mount: settings.refetch_on_mount,
            stale_time: settings.stale_time(),
            ..Self::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_on_mount(mut self, refetch: bool) -> Self {
        self.refetch_on_mount = refetch;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Called with the fresh value after every successful fetch.
    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    /// Called with the failure after every failed fetch.
    pub fn on_error(mut self, callback: impl Fn(&HandyError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}
