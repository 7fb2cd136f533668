//! Time source abstraction.
//!
//! Every expiry and staleness decision reads the time through [`Clock`] so
//! that timing behavior can be driven by hand in tests.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Time source used for TTL and staleness calculations.
pub trait Clock: Send + Sync {
    /// Return the current time.
    fn now(&self) -> Timestamp;
}

/// System clock backed by `Utc::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Elapsed time from `earlier` to `later`, saturating at zero.
pub fn elapsed_between(earlier: Timestamp, later: Timestamp) -> Duration {
    later
        .signed_duration_since(earlier)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Add a std duration to a timestamp, saturating at the maximum timestamp.
pub fn add_duration(at: Timestamp, duration: Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
