//! Two-tier cache engine.
//!
//! The in-process tier is a map of JSON entries behind a lock. The
//! persistent tier is any [`KeyValueStore`]; entries there live under a
//! reserved prefix and are encoded as [`PersistedEntry`].
//!
//! Persistent-tier failures are logged and swallowed: the in-process copy
//! stays authoritative for the life of the process. Expired or undecodable
//! entries read as misses and are removed from both tiers. Reading an entry
//! as the wrong type is a miss that leaves it in place.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use handy_core::{CacheError, Clock, KeyValueStore, SystemClock, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::entry::{CacheEntry, PersistedEntry};
use super::keys::{logical_key, storage_key, CACHE_KEY_PREFIX};
use super::read::{CacheRead, CacheTier};
use super::stats::CacheStats;

/// Configuration for the cache engine.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL used by [`CacheEngine::set_default`].
    pub default_ttl: Duration,
    /// Prefix for persistent-tier keys.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            key_prefix: CACHE_KEY_PREFIX.to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the persistent key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

type MemoryTier = HashMap<String, CacheEntry<Value>>;

/// Two-tier TTL cache shared by every query in the process.
pub struct CacheEngine {
    memory: RwLock<MemoryTier>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    stats: RwLock<CacheStats>,
}

impl CacheEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            store,
            clock,
            config,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Engine on the system clock with default config.
    pub fn with_defaults(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, Arc::new(SystemClock), CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The clock this engine measures expiry with.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Store `value` under `key` for `ttl`.
    ///
    /// The in-process tier is updated before the first suspension point;
    /// the persistent write follows and a failure there is only logged.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl {
                key: key.to_string(),
            });
        }
        let value = serde_json::to_value(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        let encoded = entry.to_persisted().encode(key)?;
        self.memory_write().insert(key.to_string(), entry);
        trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "Cache set");

        let stored = storage_key(&self.config.key_prefix, key);
        if let Err(e) = self.store.set_item(&stored, &encoded).await {
            warn!(key = %key, error = %e, "Persistent cache write failed; keeping in-memory copy");
        }
        Ok(())
    }

    /// Store `value` under `key` with the configured default TTL.
    pub async fn set_default<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        self.set(key, value, self.config.default_ttl).await
    }

    /// Fetch a live value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read(key).await.map(CacheRead::into_value)
    }

    /// Fetch a live value along with when it was written and which tier
    /// served it.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let now = self.clock.now();

        let cached = self.memory_read().get(key).cloned();
        if let Some(entry) = cached {
            return self.serve(entry, now, CacheTier::Memory).await;
        }

        let stored = storage_key(&self.config.key_prefix, key);
        let raw = match self.store.get_item(&stored).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.record(|s| s.misses += 1);
                trace!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Persistent cache read failed; treating as miss");
                self.record(|s| s.misses += 1);
                return None;
            }
        };

        let entry = match PersistedEntry::decode(key, &raw)
            .and_then(|persisted| CacheEntry::from_persisted(key, persisted))
        {
            Ok(entry) => entry,
            Err(e) => {
                self.drop_corrupt(key, &e).await;
                return None;
            }
        };
        self.serve(entry, now, CacheTier::Persistent).await
    }

    /// Remove `key` from both tiers. Absent keys are a no-op.
    pub async fn delete(&self, key: &str) {
        self.memory_write().remove(key);
        let stored = storage_key(&self.config.key_prefix, key);
        if let Err(e) = self.store.remove_item(&stored).await {
            warn!(key = %key, error = %e, "Persistent cache remove failed");
        }
    }

    /// Remove every entry this engine owns. Persistent keys outside the
    /// cache prefix are left alone.
    pub async fn clear(&self) {
        self.memory_write().clear();

        let owned = match self.persisted_keys().await {
            Some(keys) => keys,
            None => return,
        };
        let stored: Vec<String> = owned.into_iter().map(|(stored, _)| stored).collect();
        if let Err(e) = self.store.multi_remove(&stored).await {
            warn!(count = stored.len(), error = %e, "Persistent cache clear failed");
        }
        debug!(count = stored.len(), "Cache cleared");
    }

    /// Remove every entry whose logical key contains `pattern`.
    ///
    /// Returns the number of distinct keys removed across both tiers. An
    /// empty pattern matches every key.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut removed: BTreeSet<String> = BTreeSet::new();
        {
            let mut memory = self.memory_write();
            memory.retain(|key, _| {
                if key.contains(pattern) {
                    removed.insert(key.clone());
                    false
                } else {
                    true
                }
            });
        }

        if let Some(owned) = self.persisted_keys().await {
            let mut stored = Vec::new();
            for (stored_key, logical) in owned {
                if logical.contains(pattern) {
                    removed.insert(logical);
                    stored.push(stored_key);
                }
            }
            if !stored.is_empty() {
                if let Err(e) = self.store.multi_remove(&stored).await {
                    warn!(pattern = %pattern, error = %e, "Persistent cache invalidation failed");
                }
            }
        }

        debug!(pattern = %pattern, removed = removed.len(), "Cache pattern invalidated");
        removed.len()
    }

    /// Return the cached value for `key`, or run `fetch` once and cache its
    /// result for `ttl`.
    ///
    /// A failed fetch is returned as-is and nothing is cached. Concurrent
    /// misses on the same key each run their own fetch; the last write wins.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, fetch: F, ttl: Duration) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(value);
        }
        let value = fetch().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!(key = %key, error = %e, "Fetched value not cached");
        }
        Ok(value)
    }

    /// Snapshot of the engine's counters.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self
            .stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        stats.entry_count = self.memory_read().len() as u64;
        stats
    }

    /// Number of entries in the in-process tier, expired ones included.
    pub fn memory_len(&self) -> usize {
        self.memory_read().len()
    }

    async fn serve<T: DeserializeOwned>(
        &self,
        entry: CacheEntry<Value>,
        now: Timestamp,
        tier: CacheTier,
    ) -> Option<CacheRead<T>> {
        if entry.is_expired(now) {
            trace!(key = %entry.key, "Cache entry expired");
            self.record(|s| {
                s.expirations += 1;
                s.misses += 1;
            });
            self.delete(&entry.key).await;
            return None;
        }

        // The stored JSON is sound at this point; a decode failure means the
        // caller asked for the wrong type, which leaves the entry alone.
        let read = match entry.decode::<T>() {
            Ok(value) => Some(CacheRead::new(value, entry.written_at, entry.expires_at, tier)),
            Err(e) => {
                debug!(key = %entry.key, error = %e, "Cached value has a different type; treating as miss");
                None
            }
        };
        let hit = read.is_some();

        match tier {
            CacheTier::Memory if hit => self.record(|s| {
                s.hits += 1;
                s.memory_hits += 1;
            }),
            CacheTier::Memory => self.record(|s| s.misses += 1),
            CacheTier::Persistent => {
                // A `set` that landed while we were reading the store wins.
                self.memory_write()
                    .entry(entry.key.clone())
                    .or_insert(entry);
                if hit {
                    self.record(|s| {
                        s.hits += 1;
                        s.persistent_hits += 1;
                    });
                } else {
                    self.record(|s| s.misses += 1);
                }
            }
        }
        read
    }

    async fn drop_corrupt(&self, key: &str, error: &CacheError) {
        warn!(key = %key, error = %error, "Dropping corrupt cache entry");
        self.record(|s| {
            s.corrupt_entries += 1;
            s.misses += 1;
        });
        self.delete(key).await;
    }

    /// Persistent keys owned by this engine, paired with their logical keys.
    async fn persisted_keys(&self) -> Option<Vec<(String, String)>> {
        match self.store.get_all_keys().await {
            Ok(keys) => Some(
                keys.into_iter()
                    .filter_map(|stored| {
                        let logical = logical_key(&self.config.key_prefix, &stored)?.to_string();
                        Some((stored, logical))
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "Persistent cache key enumeration failed");
                None
            }
        }
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }

    fn memory_read(&self) -> RwLockReadGuard<'_, MemoryTier> {
        self.memory.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn memory_write(&self) -> RwLockWriteGuard<'_, MemoryTier> {
        self.memory.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("config", &self.config)
            .field("entries", &self.memory_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;
    use handy_test_utils::{ManualClock, RecordingKeyValueStore};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        rating: f64,
    }

    fn engine_with(store: Arc<dyn KeyValueStore>) -> (CacheEngine, ManualClock) {
        let clock = ManualClock::default();
        let engine = CacheEngine::new(store, Arc::new(clock.clone()), CacheConfig::default());
        (engine, clock)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (engine, _clock) = engine_with(Arc::new(MemoryKeyValueStore::new()));
        let profile = Profile {
            name: "Ana".to_string(),
            rating: 4.5,
        };
        engine
            .set("users_1", &profile, Duration::from_secs(60))
            .await
            .expect("set should succeed");
        assert_eq!(engine.get::<Profile>("users_1").await, Some(profile));
        assert_eq!(engine.get::<Profile>("users_2").await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let (engine, _clock) = engine_with(Arc::new(MemoryKeyValueStore::new()));
        let err = engine
            .set("k", &1, Duration::ZERO)
            .await
            .expect_err("zero ttl should fail");
        assert_eq!(err, CacheError::InvalidTtl { key: "k".to_string() });
        assert_eq!(engine.memory_len(), 0);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (engine, clock) = engine_with(Arc::new(MemoryKeyValueStore::new()));
        engine.set("k", "old", Duration::from_secs(1)).await.expect("set");
        engine.set("k", "new", Duration::from_secs(10)).await.expect("set");

        clock.advance(Duration::from_secs(5));
        assert_eq!(engine.get::<String>("k").await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_expired_entry_removed_from_both_tiers() {
        let store = Arc::new(RecordingKeyValueStore::new());
        let (engine, clock) = engine_with(store.clone());
        engine.set("k", "v", Duration::from_millis(1000)).await.expect("set");

        clock.advance(Duration::from_millis(1000));
        assert_eq!(engine.get::<String>("k").await, None);
        assert_eq!(engine.memory_len(), 0);
        assert!(store.raw("@cache_k").is_none());
        assert_eq!(engine.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_persistent_write_failure_keeps_memory_copy() {
        let store = Arc::new(RecordingKeyValueStore::new());
        store.fail_writes(true);
        let (engine, _clock) = engine_with(store.clone());

        engine
            .set("k", &42u32, Duration::from_secs(60))
            .await
            .expect("persistent failure is not surfaced");
        assert_eq!(engine.get::<u32>("k").await, Some(42));
        assert!(store.raw("@cache_k").is_none());
    }

    #[tokio::test]
    async fn test_persistent_read_failure_is_miss() {
        let store = Arc::new(RecordingKeyValueStore::new());
        let (engine, _clock) = engine_with(store.clone());
        store.insert_raw("@cache_k", r#"{"data":1,"timestamp":0,"expiry":99999999999999}"#);
        store.fail_reads(true);

        assert_eq!(engine.get::<u32>("k").await, None);
        assert_eq!(engine.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_corrupt_persisted_entry_dropped() {
        let store = Arc::new(RecordingKeyValueStore::new());
        let (engine, _clock) = engine_with(store.clone());
        store.insert_raw("@cache_bad", "{not json");

        assert_eq!(engine.get::<String>("bad").await, None);
        assert!(store.raw("@cache_bad").is_none());
        assert_eq!(engine.stats().corrupt_entries, 1);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_miss_and_keeps_entry() {
        let store = Arc::new(RecordingKeyValueStore::new());
        let (engine, _clock) = engine_with(store.clone());
        engine.set("k", "text", Duration::from_secs(60)).await.expect("set");

        assert_eq!(engine.get::<u64>("k").await, None);
        assert_eq!(engine.memory_len(), 1);
        assert!(store.raw("@cache_k").is_some());
        assert_eq!(engine.get::<String>("k").await.as_deref(), Some("text"));

        let stats = engine.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.corrupt_entries, 0);

        // Same through a cold engine reading the persistent tier.
        let (cold, _clock) = engine_with(store.clone());
        assert_eq!(cold.get::<u64>("k").await, None);
        assert_eq!(cold.get::<String>("k").await.as_deref(), Some("text"));
        assert_eq!(cold.stats().corrupt_entries, 0);
    }

    #[tokio::test]
    async fn test_clear_leaves_foreign_keys() {
        let store = Arc::new(RecordingKeyValueStore::new());
        let (engine, _clock) = engine_with(store.clone());
        store.insert_raw("onboarding_seen", "true");
        engine.set("a", &1, Duration::from_secs(60)).await.expect("set");
        engine.set("b", &2, Duration::from_secs(60)).await.expect("set");

        engine.clear().await;
        assert_eq!(engine.memory_len(), 0);
        assert_eq!(store.keys(), vec!["onboarding_seen".to_string()]);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_counts_distinct_keys() {
        let store = Arc::new(RecordingKeyValueStore::new());
        let (engine, _clock) = engine_with(store.clone());
        engine.set("users_1", &1, Duration::from_secs(60)).await.expect("set");
        engine.set("users_list", &2, Duration::from_secs(60)).await.expect("set");
        engine.set("services_1", &3, Duration::from_secs(60)).await.expect("set");
        // Persisted only, e.g. written by a previous process.
        store.insert_raw(
            "@cache_cold_users_9",
            r#"{"data":9,"timestamp":0,"expiry":99999999999999}"#,
        );

        let removed = engine.invalidate_pattern("users").await;
        assert_eq!(removed, 3);
        assert_eq!(engine.get::<u32>("services_1").await, Some(3));
        assert_eq!(store.keys(), vec!["@cache_services_1".to_string()]);
    }

    #[tokio::test]
    async fn test_get_or_fetch_error_not_cached() {
        let (engine, _clock) = engine_with(Arc::new(MemoryKeyValueStore::new()));
        let result: Result<u32, String> = engine
            .get_or_fetch("k", || async { Err("offline".to_string()) }, Duration::from_secs(5))
            .await;
        assert_eq!(result, Err("offline".to_string()));
        assert_eq!(engine.memory_len(), 0);

        let result: Result<u32, String> = engine
            .get_or_fetch("k", || async { Ok(7) }, Duration::from_secs(5))
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(engine.get::<u32>("k").await, Some(7));
    }

    #[tokio::test]
    async fn test_read_reports_tier_and_write_time() {
        let store = Arc::new(RecordingKeyValueStore::new());
        let clock = ManualClock::default();
        let written_at = clock.now();
        let first = CacheEngine::new(store.clone(), Arc::new(clock.clone()), CacheConfig::default());
        first.set("k", &1u8, Duration::from_secs(60)).await.expect("set");

        let read = first.read::<u8>("k").await.expect("memory hit");
        assert_eq!(read.tier(), CacheTier::Memory);
        assert_eq!(read.written_at(), written_at);

        let second = CacheEngine::new(store, Arc::new(clock), CacheConfig::default());
        let read = second.read::<u8>("k").await.expect("persistent hit");
        assert_eq!(read.tier(), CacheTier::Persistent);
        assert_eq!(read.written_at(), written_at);
        assert_eq!(second.stats().persistent_hits, 1);
    }

    #[tokio::test]
    async fn test_custom_prefix_isolates_engines() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let clock = ManualClock::default();
        let a = CacheEngine::new(
            Arc::clone(&store),
            Arc::new(clock.clone()),
            CacheConfig::new().with_prefix("@a_"),
        );
        let b = CacheEngine::new(store, Arc::new(clock), CacheConfig::new().with_prefix("@b_"));
        a.set("k", &1, Duration::from_secs(60)).await.expect("set");
        b.set("k", &2, Duration::from_secs(60)).await.expect("set");

        a.clear().await;
        assert_eq!(b.get::<u32>("k").await, Some(2));
    }

    #[test]
    fn test_cache_config_builder() {
        let config = CacheConfig::new()
            .with_ttl(Duration::from_secs(60))
            .with_prefix("@test_");
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.key_prefix, "@test_");
        assert_eq!(CacheConfig::default().key_prefix, CACHE_KEY_PREFIX);
    }
}
