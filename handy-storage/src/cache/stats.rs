/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits from either tier.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hits served by the in-process tier.
    pub memory_hits: u64,
    /// Hits served by the persistent tier (and repopulated into memory).
    pub persistent_hits: u64,
    /// Entries dropped because they had expired.
    pub expirations: u64,
    /// Entries dropped because they could not be decoded.
    pub corrupt_entries: u64,
    /// Number of entries currently in the in-process tier.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
