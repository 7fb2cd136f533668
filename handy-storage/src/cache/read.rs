//! Cache reads carrying their provenance.

use handy_core::clock::elapsed_between;
use handy_core::Timestamp;
use std::time::Duration;

/// Which tier served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Persistent,
}

/// Result of a cache read, carrying write time and expiry.
///
/// Query controllers use `written_at` to share staleness across consumers
/// of the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    written_at: Timestamp,
    expires_at: Timestamp,
    tier: CacheTier,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, written_at: Timestamp, expires_at: Timestamp, tier: CacheTier) -> Self {
        Self {
            value,
            written_at,
            expires_at,
            tier,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn written_at(&self) -> Timestamp {
        self.written_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn tier(&self) -> CacheTier {
        self.tier
    }

    /// How long ago the value was written.
    pub fn age(&self, now: Timestamp) -> Duration {
        elapsed_between(self.written_at, now)
    }

    /// Time left before expiry, zero once expired.
    pub fn time_to_live(&self, now: Timestamp) -> Duration {
        elapsed_between(now, self.expires_at)
    }

    /// Map the value, keeping the metadata.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            written_at: self.written_at,
            expires_at: self.expires_at,
            tier: self.tier,
        }
    }
}
