//! Authentication capability.
//!
//! The auth platform is opaque; the core needs sign-in/out and a stream of
//! auth-state transitions. Subscriptions are owned values that unsubscribe
//! when dropped, so a torn-down consumer can never receive a late callback.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::AuthError;

/// Authenticated principal handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// A single auth-state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn(Identity),
    SignedOut,
}

impl AuthChange {
    pub fn from_identity(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => Self::SignedIn(identity),
            None => Self::SignedOut,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::SignedIn(identity) => Some(identity),
            Self::SignedOut => None,
        }
    }
}

/// Authentication service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Register a new account and sign it in.
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Sign the current identity out.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The identity signed in right now, if any.
    fn current_identity(&self) -> Option<Identity>;

    /// Subscribe to auth-state transitions.
    ///
    /// The subscription first yields the current state, then every later
    /// transition. Dropping it unsubscribes.
    fn on_auth_state_changed(&self) -> AuthSubscription;
}

type Release = Box<dyn FnOnce() + Send>;

/// Owned auth-state subscription. Unsubscribes on drop.
pub struct AuthSubscription {
    receiver: mpsc::UnboundedReceiver<AuthChange>,
    release: Option<Release>,
}

impl AuthSubscription {
    /// Wrap a receiver with the callback that detaches it from its source.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<AuthChange>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next transition. `None` once the source is gone.
    pub async fn next(&mut self) -> Option<AuthChange> {
        self.receiver.recv().await
    }

    /// Take a transition that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<AuthChange> {
        self.receiver.try_recv().ok()
    }

    /// Unsubscribe explicitly. Equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for AuthSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSubscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    current: Option<Identity>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<AuthChange>>,
}

/// Fan-out of auth-state transitions to any number of subscriptions.
///
/// Auth providers hold one hub, call [`AuthStateHub::publish`] on every
/// transition and hand out subscriptions from [`AuthStateHub::subscribe`].
#[derive(Clone, Default)]
pub struct AuthStateHub {
    inner: Arc<Mutex<HubInner>>,
}

impl AuthStateHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    /// Register a subscription primed with the current state.
    pub fn subscribe(&self) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            let _ = tx.send(AuthChange::from_identity(inner.current.clone()));
            inner.subscribers.insert(id, tx);
            id
        };

        let weak: Weak<Mutex<HubInner>> = Arc::downgrade(&self.inner);
        AuthSubscription::new(rx, move || {
            if let Some(hub) = weak.upgrade() {
                if let Ok(mut inner) = hub.lock() {
                    inner.subscribers.remove(&id);
                }
            }
        })
    }

    /// Record a transition and deliver it to every live subscription.
    pub fn publish(&self, identity: Option<Identity>) {
        let mut inner = self.lock();
        inner.current = identity.clone();
        let change = AuthChange::from_identity(identity);
        inner
            .subscribers
            .retain(|_, tx| tx.send(change.clone()).is_ok());
    }

    /// Number of subscriptions that have not been released.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for AuthStateHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStateHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
