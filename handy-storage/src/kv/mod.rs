//! Key-value store implementations backing the persistent cache tier.

pub mod lmdb;
pub mod memory;

pub use lmdb::LmdbKeyValueStore;
pub use memory::MemoryKeyValueStore;
