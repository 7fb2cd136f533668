//! Handy Storage - Cache and Key-Value Stores
//!
//! The persistent key-value tier (in-memory and LMDB implementations) and
//! the two-tier [`CacheEngine`] built on top of it.

pub mod cache;
pub mod kv;

pub use cache::{
    CacheConfig, CacheEngine, CacheEntry, CacheRead, CacheStats, CacheTier, PersistedEntry,
    CACHE_KEY_PREFIX,
};
pub use kv::{LmdbKeyValueStore, MemoryKeyValueStore};

use std::sync::Arc;

use handy_core::{KeyValueStore, PersistenceBackend, PersistenceConfig, StorageError};

/// Open the key-value store selected by `config`.
pub fn open_store(config: &PersistenceConfig) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    match config.backend {
        PersistenceBackend::Memory => Ok(Arc::new(MemoryKeyValueStore::new())),
        PersistenceBackend::Lmdb => {
            let path = config.path.as_ref().ok_or_else(|| StorageError::Open {
                path: String::new(),
                reason: "no path configured for the lmdb backend".to_string(),
            })?;
            Ok(Arc::new(LmdbKeyValueStore::open(path, config.max_size_mb)?))
        }
    }
}
