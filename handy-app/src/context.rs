//! Explicitly constructed application context.
//!
//! One [`AppContext`] owns every long-lived service: the persistent store,
//! the cache, the query client and the session resolver. Consumers get them
//! by reference from the context instead of through globals, and a fresh
//! context can be built per test.

use std::sync::Arc;

use handy_core::{
    AuthError, AuthProvider, Clock, Collection, DocumentStore, HandyConfig, HandyResult,
    Identity, SystemClock,
};
use handy_query::QueryClient;
use handy_session::{NavigationRoot, SessionResolver, SessionState};
use handy_storage::{open_store, CacheConfig, CacheEngine};
use tracing::{debug, info, warn};

pub struct AppContext {
    config: HandyConfig,
    auth: Arc<dyn AuthProvider>,
    documents: Arc<dyn DocumentStore>,
    cache: Arc<CacheEngine>,
    queries: QueryClient,
    session: SessionResolver,
}

impl AppContext {
    /// Validate `config`, open the configured store and start every service.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(
        config: HandyConfig,
        auth: Arc<dyn AuthProvider>,
        documents: Arc<dyn DocumentStore>,
    ) -> HandyResult<Self> {
        Self::initialize_with_clock(config, auth, documents, Arc::new(SystemClock))
    }

    /// Like [`AppContext::initialize`] with an explicit clock.
    pub fn initialize_with_clock(
        config: HandyConfig,
        auth: Arc<dyn AuthProvider>,
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> HandyResult<Self> {
        config.validate()?;

        let store = open_store(&config.persistence)?;
        let cache = Arc::new(CacheEngine::new(
            store,
            Arc::clone(&clock),
            CacheConfig::new().with_ttl(config.cache.default_ttl()),
        ));
        let queries = QueryClient::new(Arc::clone(&cache), config.query.clone());
        let session = SessionResolver::start(
            auth.as_ref(),
            Arc::clone(&documents),
            config.session.clone(),
            clock,
        );

        info!(
            environment = ?config.environment,
            backend = ?config.persistence.backend,
            default_ttl_ms = config.cache.default_ttl_ms,
            "Application context initialized"
        );

        Ok(Self {
            config,
            auth,
            documents,
            cache,
            queries,
            session,
        })
    }

    pub fn config(&self) -> &HandyConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheEngine> {
        &self.cache
    }

    pub fn query_client(&self) -> &QueryClient {
        &self.queries
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    pub fn session(&self) -> &SessionResolver {
        &self.session
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn navigation_root(&self) -> Option<NavigationRoot> {
        self.session.navigation_root()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.auth.current_identity()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        match self.auth.sign_in(email, password).await {
            Ok(identity) => {
                info!(uid = %identity.uid, "Sign-in succeeded");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                Err(e)
            }
        }
    }

    pub async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        match self.auth.create_account(email, password).await {
            Ok(identity) => {
                info!(uid = %identity.uid, "Account created");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "Account creation failed");
                Err(e)
            }
        }
    }

    /// Sign out and drop every cached query, so the next user starts cold.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Err(e) = self.auth.sign_out().await {
            warn!(error = %e, "Sign-out failed");
            return Err(e);
        }
        self.cache.clear().await;
        debug!("Cache cleared after sign-out");
        Ok(())
    }

    /// Drop cached queries for one collection.
    pub async fn invalidate_collection(&self, collection: Collection) -> usize {
        self.queries.invalidate(collection.as_str()).await
    }

    /// Stop the session resolver and release the auth subscription.
    pub async fn shutdown(self) {
        self.session.shutdown().await;
        info!("Application context shut down");
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("environment", &self.config.environment)
            .field("cache", &self.cache)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
