//! LMDB-backed key-value store.
//!
//! Uses the heed crate (Rust bindings for LMDB) as the durable tier behind
//! the cache. One unnamed database holds UTF-8 keys and values.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get_item` and `get_all_keys`
//! - Write transactions for `set_item`, `remove_item` and `multi_remove`
//!   (`multi_remove` deletes every key in a single transaction)

use std::path::Path;

use async_trait::async_trait;
use handy_core::{KeyValueStore, StorageError};
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};

/// Durable [`KeyValueStore`] on LMDB.
///
/// # Example
///
/// ```ignore
/// use handy_storage::LmdbKeyValueStore;
///
/// let store = LmdbKeyValueStore::open("/var/lib/handy/cache", 64)?;
/// store.set_item("@cache_users_1", "{...}").await?;
/// ```
pub struct LmdbKeyValueStore {
    env: Env,
    db: Database<Str, Str>,
}

impl LmdbKeyValueStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let open_error = |reason: String| StorageError::Open {
            path: path.display().to_string(),
            reason,
        };

        std::fs::create_dir_all(path).map_err(|e| open_error(e.to_string()))?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path)
        }
        .map_err(|e| open_error(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(|e| open_error(e.to_string()))?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| open_error(e.to_string()))?;
        wtxn.commit().map_err(|e| open_error(e.to_string()))?;

        Ok(Self { env, db })
    }
}

#[async_trait]
impl KeyValueStore for LmdbKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let read_error = |e: heed::Error| StorageError::Read {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let rtxn = self.env.read_txn().map_err(read_error)?;
        let value = self.db.get(&rtxn, key).map_err(read_error)?;
        Ok(value.map(str::to_string))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let write_error = |e: heed::Error| StorageError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let mut wtxn = self.env.write_txn().map_err(write_error)?;
        self.db.put(&mut wtxn, key, value).map_err(write_error)?;
        wtxn.commit().map_err(write_error)?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let remove_error = |e: heed::Error| StorageError::Remove {
            count: 1,
            reason: e.to_string(),
        };
        let mut wtxn = self.env.write_txn().map_err(remove_error)?;
        self.db.delete(&mut wtxn, key).map_err(remove_error)?;
        wtxn.commit().map_err(remove_error)?;
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        let enumerate_error = |e: heed::Error| StorageError::Enumerate {
            reason: e.to_string(),
        };
        let rtxn = self.env.read_txn().map_err(enumerate_error)?;
        let iter = self.db.iter(&rtxn).map_err(enumerate_error)?;

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(enumerate_error)?;
            keys.push(key.to_string());
        }
        Ok(keys)
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let remove_error = |e: heed::Error| StorageError::Remove {
            count: keys.len(),
            reason: e.to_string(),
        };
        let mut wtxn = self.env.write_txn().map_err(remove_error)?;
        for key in keys {
            self.db.delete(&mut wtxn, key).map_err(remove_error)?;
        }
        wtxn.commit().map_err(remove_error)?;
        Ok(())
    }
}
