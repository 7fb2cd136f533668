//! Handy Session - Role Resolution
//!
//! Turns auth-state transitions into a navigation decision:
//!
//! - [`state`]: the pure session state machine
//! - [`lookup`]: role lookup against the `users` collection, failing open to
//!   `Client`, with optional profile provisioning
//! - [`navigation`]: which navigation root a session phase mounts
//! - [`resolver`]: the live task that ties an auth subscription to the state
//!   machine
//!
//! # Example
//!
//! ```ignore
//! let resolver = SessionResolver::start(auth.as_ref(), documents, settings, clock);
//! match resolver.wait_for_decision().await {
//!     Some(NavigationRoot::WorkerFlow) => show_worker_home(),
//!     Some(NavigationRoot::ClientFlow) => show_client_home(),
//!     Some(NavigationRoot::AuthFlow) | None => show_sign_in(),
//! }
//! ```

pub mod lookup;
pub mod navigation;
pub mod resolver;
pub mod state;

pub use lookup::{lookup_role, RoleLookup, RoleSource};
pub use navigation::{root_for, NavigationRoot};
pub use resolver::SessionResolver;
pub use state::{ResolutionStatus, SessionEvent, SessionPhase, SessionState};
