//! Handy Core - Shared Types
//!
//! Errors, time, configuration, capability interfaces for the external
//! platform (auth, document store, key-value store) and the schema'd
//! collection records. All other crates depend on this one.

pub mod auth;
pub mod clock;
pub mod config;
pub mod documents;
pub mod error;
pub mod kv;
pub mod records;

pub use auth::{AuthChange, AuthProvider, AuthStateHub, AuthSubscription, Identity};
pub use clock::{Clock, SystemClock, Timestamp};
pub use config::{
    CacheSettings, Environment, HandyConfig, LoggingConfig, PersistenceBackend,
    PersistenceConfig, QuerySettings, SessionSettings,
};
pub use documents::{Collection, Document, DocumentStore, Fields, Page, PageRequest};
pub use error::{
    AuthError, CacheError, ConfigError, DocumentError, HandyError, HandyResult, QueryError,
    StorageError,
};
pub use kv::KeyValueStore;
pub use records::{
    BookingRecord, BookingStatus, GeoLocation, PaymentStatus, PriceType, Record, ReviewRecord,
    Role, RoleField, ServiceRecord, UserRecord,
};
