//! Navigation-root decision.

use std::fmt;

use crate::state::SessionPhase;

/// The three top-level navigation trees. Exactly one is mounted once a
/// session is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationRoot {
    /// Sign-in and registration screens.
    AuthFlow,
    ClientFlow,
    WorkerFlow,
}

impl NavigationRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationRoot::AuthFlow => "auth",
            NavigationRoot::ClientFlow => "client",
            NavigationRoot::WorkerFlow => "worker",
        }
    }
}

impl fmt::Display for NavigationRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root to mount for `phase`, or `None` while the phase must show a loading
/// indicator instead.
pub fn root_for(phase: SessionPhase) -> Option<NavigationRoot> {
    match phase {
        SessionPhase::Initializing | SessionPhase::ResolvingRole => None,
        SessionPhase::Unauthenticated => Some(NavigationRoot::AuthFlow),
        SessionPhase::Client | SessionPhase::Error => Some(NavigationRoot::ClientFlow),
        SessionPhase::Worker => Some(NavigationRoot::WorkerFlow),
    }
}
