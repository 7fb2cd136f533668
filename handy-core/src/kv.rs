//! Persistent key-value capability.
//!
//! String-keyed, string-valued store that survives process restarts. No
//! ordering or transaction guarantees are assumed beyond per-key
//! last-write-wins.

use async_trait::async_trait;

use crate::error::StorageError;

/// Persistent key-value store used as the durable cache tier.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Enumerate every key in the store.
    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove every key in `keys`. Absent keys are skipped.
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError>;
}
