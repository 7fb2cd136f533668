//! Handy App - Application Context
//!
//! Builds the services from a [`HandyConfig`](handy_core::HandyConfig) and the
//! platform's auth and document capabilities, and owns them for the life of
//! the app.
//!
//! ```ignore
//! let config = HandyConfig::load()?;
//! init_tracing(&config.logging)?;
//! let app = AppContext::initialize(config, auth, documents)?;
//! let root = app.session().wait_for_decision().await;
//! // ...
//! app.shutdown().await;
//! ```

pub mod context;
pub mod telemetry;

pub use context::AppContext;
pub use telemetry::{default_directive, init_tracing};
