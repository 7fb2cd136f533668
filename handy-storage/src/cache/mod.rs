//! Two-tier TTL cache.
//!
//! [`CacheEngine`] keeps a process-wide in-memory map in front of a
//! persistent [`KeyValueStore`](handy_core::KeyValueStore). Reads check
//! memory first, fall back to the persistent tier and repopulate memory on
//! a hit. Entries past their expiry are never returned; they are removed
//! from both tiers on the read that finds them.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheEngine::with_defaults(Arc::new(MemoryKeyValueStore::new()));
//!
//! cache.set("users_42", &profile, Duration::from_secs(60)).await?;
//! let profile: Option<UserRecord> = cache.get("users_42").await;
//!
//! // Drop every cached read of the users collection
//! cache.invalidate_pattern("users").await;
//! ```

pub mod engine;
pub mod entry;
pub mod keys;
pub mod read;
pub mod stats;

pub use engine::{CacheConfig, CacheEngine};
pub use entry::{CacheEntry, PersistedEntry};
pub use keys::{logical_key, storage_key, CACHE_KEY_PREFIX};
pub use read::{CacheRead, CacheTier};
pub use stats::CacheStats;
