//! Cache key namespacing.
//!
//! Logical keys are what callers pass to the engine. Persistent-tier keys
//! are the logical key behind a reserved prefix, so the engine can find and
//! remove its own entries without touching anything else in the store.

use handy_core::Collection;

/// Reserved prefix for persistent-tier cache entries.
pub const CACHE_KEY_PREFIX: &str = "@cache_";

/// Persistent-tier key for a logical key.
pub fn storage_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Logical key for a persistent-tier key, or `None` if the key was not
/// written by a cache using `prefix`.
pub fn logical_key<'a>(prefix: &str, stored: &'a str) -> Option<&'a str> {
    stored.strip_prefix(prefix)
}

/// Key for a single document, e.g. `users_abc123`.
pub fn document(collection: Collection, id: &str) -> String {
    format!("{}_{id}", collection.as_str())
}

/// Key for a collection-level query, e.g. `services_list_active`.
///
/// Both helpers start with the collection name, so
/// `invalidate_pattern(collection.as_str())` drops every cached read of it.
pub fn collection(collection: Collection, query: &str) -> String {
    if query.is_empty() {
        format!("{}_list", collection.as_str())
    } else {
        format!("{}_list_{query}", collection.as_str())
    }
}
