//! Observable query state.

use std::time::Duration;

use handy_core::clock::elapsed_between;
use handy_core::{HandyError, Timestamp};

/// Snapshot of a query as its consumer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// Last value fetched or served from cache.
    pub data: Option<T>,
    /// True while a fetch is in flight.
    pub loading: bool,
    /// Last failure. Cleared when the next fetch starts.
    pub error: Option<HandyError>,
    /// When the data was last fetched (or written to the cache by another
    /// consumer of the same key).
    pub last_fetched_at: Option<Timestamp>,
}

impl<T> QueryState<T> {
    /// Initial state. An enabled query starts out loading.
    pub fn initial(enabled: bool) -> Self {
        Self {
            data: None,
            loading: enabled,
            error: None,
            last_fetched_at: None,
        }
    }

    /// Stale when never fetched, or fetched more than `stale_time` ago.
    pub fn is_stale(&self, now: Timestamp, stale_time: Duration) -> bool {
        match self.last_fetched_at {
            None => true,
            Some(fetched_at) => elapsed_between(fetched_at, now) > stale_time,
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }
}
