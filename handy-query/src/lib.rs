//! Handy Query - Cached Data Fetching
//!
//! [`QueryController`] runs a query function for one key, consulting the
//! shared [`CacheEngine`](handy_storage::CacheEngine) first and tracking
//! loading, error, data and staleness as observable [`QueryState`].
//! [`QueryClient`] builds controllers that share one cache.
//!
//! # Example
//!
//! ```ignore
//! let services = client
//!     .run(
//!         "services_list_active",
//!         move || list_active_services(documents.clone()),
//!         client.options().on_error(|e| tracing::warn!(error = %e, "load failed")),
//!     )
//!     .await;
//!
//! if services.is_stale() {
//!     services.refetch().await?;
//! }
//! ```

pub mod client;
pub mod controller;
pub mod options;
pub mod state;

pub use client::QueryClient;
pub use controller::{QueryController, QueryFn, QueryValue};
pub use options::{ErrorCallback, QueryOptions, SuccessCallback, DEFAULT_STALE_TIME};
pub use state::QueryState;
