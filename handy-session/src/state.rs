//! Session state machine.
//!
//! Pure transitions only. The resolver task feeds auth and lookup outcomes in
//! as [`SessionEvent`]s and publishes the resulting [`SessionState`].
//!
//! ```text
//! Initializing ─┐
//!               ├─ SignedOut ──> Unauthenticated
//!  (any) ───────┤
//!               └─ SignedIn ───> ResolvingRole ─ RoleResolved ─> Client | Worker
//!                                      │
//!                                      └─ LookupFailed ─> Error ─ Recovered ─> Client
//! ```

use handy_core::{Identity, Role};

use crate::navigation::{root_for, NavigationRoot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No auth state received yet.
    Initializing,
    Unauthenticated,
    /// Signed in, role lookup in flight.
    ResolvingRole,
    Client,
    Worker,
    /// Role lookup failed in transport. Transient; always recovers to
    /// `Client`.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStatus {
    Pending,
    Resolved,
    Failed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Identity),
    SignedOut,
    RoleResolved(Role),
    LookupFailed,
    Recovered,
}

/// Snapshot of the session.
///
/// `role` is only set while `status` is `Resolved`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
    pub role: Option<Role>,
    pub status: ResolutionStatus,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initializing()
    }
}

impl SessionState {
    pub fn initializing() -> Self {
        Self {
            phase: SessionPhase::Initializing,
            identity: None,
            role: None,
            status: ResolutionStatus::Pending,
        }
    }

    fn unauthenticated() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            ..Self::initializing()
        }
    }

    /// Apply one event.
    ///
    /// Sign-in and sign-out apply from any phase. Lookup outcomes only apply
    /// while resolving (and `Recovered` only from `Error`); anywhere else
    /// they are stale and leave the state unchanged.
    pub fn apply(&self, event: SessionEvent) -> SessionState {
        match (self.phase, event) {
            (_, SessionEvent::SignedOut) => Self::unauthenticated(),
            (_, SessionEvent::SignedIn(identity)) => Self {
                phase: SessionPhase::ResolvingRole,
                identity: Some(identity),
                role: None,
                status: ResolutionStatus::Pending,
            },
            (SessionPhase::ResolvingRole, SessionEvent::RoleResolved(role)) => Self {
                phase: match role {
                    Role::Client => SessionPhase::Client,
                    Role::Worker => SessionPhase::Worker,
                },
                identity: self.identity.clone(),
                role: Some(role),
                status: ResolutionStatus::Resolved,
            },
            (SessionPhase::ResolvingRole, SessionEvent::LookupFailed) => Self {
                phase: SessionPhase::Error,
                identity: self.identity.clone(),
                role: None,
                status: ResolutionStatus::Failed,
            },
            (SessionPhase::Error, SessionEvent::Recovered) => Self {
                phase: SessionPhase::Client,
                identity: self.identity.clone(),
                role: Some(Role::Client),
                status: ResolutionStatus::Resolved,
            },
            _ => self.clone(),
        }
    }

    /// Root to mount, or `None` while no decision may be made.
    pub fn navigation_root(&self) -> Option<NavigationRoot> {
        root_for(self.phase)
    }

    pub fn is_signed_in(&self) -> bool {
        self.identity.is_some()
    }
}
