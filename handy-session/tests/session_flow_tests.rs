//! End-to-end session resolution against in-memory auth and documents.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use handy_core::documents::get_record;
use handy_core::{
    AuthProvider, Collection, DocumentError, DocumentStore, Role, SessionSettings, UserRecord,
};
use handy_session::{
    NavigationRoot, ResolutionStatus, SessionPhase, SessionResolver, SessionState,
};
use handy_test_utils::{fixtures, ManualClock, MemoryAuthProvider, MemoryDocumentStore};
use serde_json::json;

const WAIT: Duration = Duration::from_secs(5);

fn settings(provision: bool) -> SessionSettings {
    SessionSettings {
        provision_missing_profile: provision,
    }
}

fn start(
    auth: &MemoryAuthProvider,
    documents: &Arc<MemoryDocumentStore>,
    settings: SessionSettings,
) -> SessionResolver {
    let documents: Arc<dyn DocumentStore> = documents.clone();
    SessionResolver::start(auth, documents, settings, Arc::new(ManualClock::default()))
}

async fn wait_for_phase(resolver: &SessionResolver, phase: SessionPhase) -> SessionState {
    let mut rx = resolver.subscribe();
    let state = tokio::time::timeout(WAIT, rx.wait_for(|s| s.phase == phase))
        .await
        .expect("timed out waiting for phase")
        .expect("resolver stopped");
    state.clone()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

#[tokio::test]
async fn test_signed_out_start_mounts_auth_flow() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));

    assert_eq!(resolver.wait_for_decision().await, Some(NavigationRoot::AuthFlow));
    let state = resolver.state();
    assert_eq!(state.phase, SessionPhase::Unauthenticated);
    assert!(!state.is_signed_in());
}

#[tokio::test]
async fn test_worker_sign_in_resolves_worker_flow() {
    let auth = MemoryAuthProvider::new().with_account("worker-1", "worker-1@handy.test", "secret1");
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));
    wait_for_phase(&resolver, SessionPhase::Unauthenticated).await;

    auth.sign_in("worker-1@handy.test", "secret1")
        .await
        .expect("sign in");

    let state = wait_for_phase(&resolver, SessionPhase::Worker).await;
    assert_eq!(state.role, Some(Role::Worker));
    assert_eq!(state.status, ResolutionStatus::Resolved);
    assert_eq!(resolver.navigation_root(), Some(NavigationRoot::WorkerFlow));
}

#[tokio::test]
async fn test_missing_role_fails_open_to_client() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(MemoryDocumentStore::new());
    documents.insert(Collection::Users, "nobody", fixtures::user_fields("nobody", None));
    documents.insert(
        Collection::Users,
        "odd",
        fixtures::user_fields("odd", Some(json!("superuser"))),
    );
    let resolver = start(&auth, &documents, settings(false));

    for uid in ["nobody", "odd"] {
        auth.emit_signed_in(fixtures::identity(uid));
        let state = wait_for_phase(&resolver, SessionPhase::Client).await;
        assert_eq!(state.role, Some(Role::Client));
        assert_eq!(state.status, ResolutionStatus::Resolved);
        assert_eq!(state.identity.map(|i| i.uid), Some(uid.to_string()));

        auth.emit_signed_out();
        wait_for_phase(&resolver, SessionPhase::Unauthenticated).await;
    }
}

#[tokio::test]
async fn test_sign_out_resets_worker_session() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));

    auth.emit_signed_in(fixtures::identity("worker-1"));
    wait_for_phase(&resolver, SessionPhase::Worker).await;

    auth.emit_signed_out();
    let state = wait_for_phase(&resolver, SessionPhase::Unauthenticated).await;
    assert_eq!(state.role, None);
    assert_eq!(state.identity, None);
    assert_eq!(state.status, ResolutionStatus::Pending);
    assert_eq!(resolver.navigation_root(), Some(NavigationRoot::AuthFlow));
}

#[tokio::test]
async fn test_transport_failure_continues_as_client() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    documents.fail_gets(Some(DocumentError::Transport {
        reason: "deadline exceeded".to_string(),
    }));
    let resolver = start(&auth, &documents, settings(false));

    auth.emit_signed_in(fixtures::identity("worker-1"));
    let state = wait_for_phase(&resolver, SessionPhase::Client).await;
    assert_eq!(state.role, Some(Role::Client));
    assert_eq!(state.status, ResolutionStatus::Resolved);
}

#[tokio::test]
async fn test_newer_auth_event_supersedes_lookup() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));
    wait_for_phase(&resolver, SessionPhase::Unauthenticated).await;

    documents.pause_gets();
    auth.emit_signed_in(fixtures::identity("worker-1"));
    wait_until(|| documents.get_count() == 1).await;

    auth.emit_signed_in(fixtures::identity("client-1"));
    wait_until(|| documents.get_count() == 2).await;
    assert_eq!(resolver.state().phase, SessionPhase::ResolvingRole);

    documents.resume_gets();
    let state = wait_for_phase(&resolver, SessionPhase::Client).await;
    assert_eq!(state.identity.map(|i| i.uid), Some("client-1".to_string()));

    // The dropped worker lookup must never land.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(resolver.state().phase, SessionPhase::Client);
}

#[tokio::test]
async fn test_sign_out_during_lookup_discards_result() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));

    documents.pause_gets();
    auth.emit_signed_in(fixtures::identity("worker-1"));
    wait_until(|| documents.get_count() == 1).await;

    auth.emit_signed_out();
    wait_for_phase(&resolver, SessionPhase::Unauthenticated).await;

    documents.resume_gets();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let state = resolver.state();
    assert_eq!(state.phase, SessionPhase::Unauthenticated);
    assert_eq!(state.role, None);
}

#[tokio::test]
async fn test_provisioning_creates_missing_profile() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(MemoryDocumentStore::new());
    let resolver = start(&auth, &documents, settings(true));

    let identity = auth
        .create_account("fresh@handy.test", "longenough")
        .await
        .expect("create account");
    let state = wait_for_phase(&resolver, SessionPhase::Client).await;
    assert_eq!(state.identity.as_ref(), Some(&identity));

    let profile: UserRecord = get_record(documents.as_ref(), &identity.uid)
        .await
        .expect("get")
        .expect("profile provisioned");
    assert_eq!(profile.role, Some(Role::Client));
    assert_eq!(profile.email, "fresh@handy.test");
}

#[tokio::test]
async fn test_updates_stream_starts_with_current_state() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));
    wait_for_phase(&resolver, SessionPhase::Unauthenticated).await;

    let mut updates = resolver.updates();
    let first = updates.next().await.expect("current state");
    assert_eq!(first.phase, SessionPhase::Unauthenticated);

    auth.emit_signed_in(fixtures::identity("client-1"));
    let mut seen = Vec::new();
    while let Some(state) = tokio::time::timeout(WAIT, updates.next())
        .await
        .expect("timed out waiting for update")
    {
        seen.push(state.phase);
        if state.phase == SessionPhase::Client {
            break;
        }
    }
    assert_eq!(seen.last(), Some(&SessionPhase::Client));
    assert!(!seen.contains(&SessionPhase::Worker));
}

#[tokio::test]
async fn test_drop_releases_subscription() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));
    assert_eq!(auth.subscriber_count(), 1);

    drop(resolver);
    wait_until(|| auth.subscriber_count() == 0).await;
}

#[tokio::test]
async fn test_shutdown_stops_task() {
    let auth = MemoryAuthProvider::new();
    let documents = Arc::new(fixtures::seeded_documents());
    let resolver = start(&auth, &documents, settings(false));
    assert!(resolver.is_running());

    resolver.shutdown().await;
    assert_eq!(auth.subscriber_count(), 0);
}
