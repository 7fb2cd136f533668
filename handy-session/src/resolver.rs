//! Live session resolver.
//!
//! A background task owns the auth subscription. Every sign-in starts a role
//! lookup; a newer auth event arriving first supersedes it and the stale
//! lookup is dropped. The resulting [`SessionState`] is published on a watch
//! channel.

use std::sync::Arc;

use handy_core::{
    AuthChange, AuthProvider, AuthSubscription, Clock, DocumentStore, SessionSettings,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::lookup::lookup_role;
use crate::navigation::NavigationRoot;
use crate::state::{SessionEvent, SessionState};

/// Handle to the running resolver. Dropping it stops the task and releases
/// the auth subscription.
pub struct SessionResolver {
    state: watch::Receiver<SessionState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

struct ResolverTask {
    subscription: AuthSubscription,
    documents: Arc<dyn DocumentStore>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    state: watch::Sender<SessionState>,
    shutdown: watch::Receiver<bool>,
}

impl SessionResolver {
    /// Subscribe to `auth` and spawn the resolver task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        auth: &dyn AuthProvider,
        documents: Arc<dyn DocumentStore>,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::initializing());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = ResolverTask {
            subscription: auth.on_auth_state_changed(),
            documents,
            settings,
            clock,
            state: state_tx,
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(task.run());

        Self {
            state: state_rx,
            shutdown: shutdown_tx,
            task: Some(handle),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Stream of snapshots, starting with the current one.
    pub fn updates(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.clone())
    }

    pub fn navigation_root(&self) -> Option<NavigationRoot> {
        self.state.borrow().navigation_root()
    }

    /// Wait until a navigation root may be mounted. `None` if the resolver
    /// stopped first.
    pub async fn wait_for_decision(&self) -> Option<NavigationRoot> {
        let mut state = self.state.clone();
        let decided = state.wait_for(|s| s.navigation_root().is_some()).await;
        match decided {
            Ok(s) => s.navigation_root(),
            Err(_) => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the task and wait for it to release the subscription.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Session resolver task ended abnormally");
            }
        }
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("state", &*self.state.borrow())
            .field("running", &self.is_running())
            .finish()
    }
}

impl ResolverTask {
    async fn run(mut self) {
        debug!("Session resolver started");
        let mut queued: Option<AuthChange> = None;

        loop {
            let change = match queued.take() {
                Some(change) => change,
                None => {
                    tokio::select! {
                        _ = self.shutdown.changed() => break,
                        change = self.subscription.next() => match change {
                            Some(change) => change,
                            None => break,
                        },
                    }
                }
            };

            match change {
                AuthChange::SignedOut => {
                    info!("Signed out");
                    self.apply(SessionEvent::SignedOut);
                }
                AuthChange::SignedIn(identity) => {
                    info!(uid = %identity.uid, "Signed in, resolving role");
                    self.apply(SessionEvent::SignedIn(identity.clone()));

                    let now = self.clock.now();
                    let lookup = lookup_role(self.documents.as_ref(), &identity, &self.settings, now);
                    tokio::pin!(lookup);

                    tokio::select! {
                        biased;
                        _ = self.shutdown.changed() => break,
                        next = self.subscription.next() => match next {
                            Some(next) => {
                                debug!(uid = %identity.uid, "Role lookup superseded by newer auth event");
                                queued = Some(next);
                            }
                            None => break,
                        },
                        outcome = &mut lookup => match outcome {
                            Ok(found) => {
                                info!(uid = %identity.uid, role = found.role.as_str(), "Role resolved");
                                self.apply(SessionEvent::RoleResolved(found.role));
                            }
                            Err(e) => {
                                self.apply(SessionEvent::LookupFailed);
                                warn!(uid = %identity.uid, error = %e, "Role lookup failed, continuing as client");
                                self.apply(SessionEvent::Recovered);
                            }
                        },
                    }
                }
            }
        }

        debug!("Session resolver stopped");
    }

    fn apply(&self, event: SessionEvent) {
        self.state.send_modify(|state| *state = state.apply(event));
    }
}
