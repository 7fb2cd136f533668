//! Handy Test Utilities
//!
//! Centralized test infrastructure for the Handy workspace:
//! - A hand-driven clock for TTL and staleness tests
//! - In-memory auth provider, document store and key-value store with
//!   fault injection and call counting
//! - Proptest generators for keys, payloads and role values
//! - Test fixtures for common scenarios

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use regex::Regex;
use tokio::sync::watch;
use uuid::Uuid;

pub use handy_core::{
    AuthChange, AuthError, AuthProvider, AuthStateHub, AuthSubscription, Clock, Collection,
    Document, DocumentError, DocumentStore, Fields, HandyConfig, Identity, KeyValueStore, Page,
    PageRequest, Record, Role, StorageError, Timestamp, UserRecord,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now = handy_core::clock::add_duration(*now, by);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn set(&self, at: Timestamp) {
        *lock(&self.now) = at;
    }
}

impl Default for ManualClock {
    /// Starts at 2025-01-01T00:00:00Z.
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *lock(&self.now)
    }
}

// ============================================================================
// RECORDING KEY-VALUE STORE
// ============================================================================

/// Key-value store that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingKeyValueStore {
    items: Mutex<BTreeMap<String, String>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl RecordingKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_item` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `set_item` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Make `get_item` and `get_all_keys` fail.
    pub fn fail_reads(&self, fail: bool) {
        *lock(&self.fail_reads) = fail;
    }

    /// Make `set_item`, `remove_item` and `multi_remove` fail.
    pub fn fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    /// Write a raw value directly, bypassing counters and faults.
    pub fn insert_raw(&self, key: &str, value: &str) {
        lock(&self.items).insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        lock(&self.items).get(key).cloned()
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.items).keys().cloned().collect()
    }

    fn check_read(&self, key: &str) -> Result<(), StorageError> {
        if *lock(&self.fail_reads) {
            return Err(StorageError::Read {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self, key: &str) -> Result<(), StorageError> {
        if *lock(&self.fail_writes) {
            return Err(StorageError::Write {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RecordingKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_read(key)?;
        Ok(lock(&self.items).get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_write(key)?;
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.check_write(key)?;
        lock(&self.items).remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>, StorageError> {
        if *lock(&self.fail_reads) {
            return Err(StorageError::Enumerate {
                reason: "injected read failure".to_string(),
            });
        }
        Ok(self.keys())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<(), StorageError> {
        if *lock(&self.fail_writes) {
            return Err(StorageError::Remove {
                count: keys.len(),
                reason: "injected write failure".to_string(),
            });
        }
        let mut items = lock(&self.items);
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }
}

// ============================================================================
// MEMORY AUTH PROVIDER
// ============================================================================

/// Minimum password length accepted by [`MemoryAuthProvider`].
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: String,
}

/// Auth provider backed by a map of accounts.
///
/// Transitions are published through an [`AuthStateHub`], so subscriptions
/// behave like the platform's: primed with the current state, then live.
#[derive(Debug)]
pub struct MemoryAuthProvider {
    hub: AuthStateHub,
    accounts: Mutex<HashMap<String, Account>>,
    next_failure: Mutex<Option<AuthError>>,
    email_pattern: Option<Regex>,
}

impl Default for MemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuthProvider {
    pub fn new() -> Self {
        Self {
            hub: AuthStateHub::new(),
            accounts: Mutex::new(HashMap::new()),
            next_failure: Mutex::new(None),
            email_pattern: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok(),
        }
    }

    /// Register an account without signing it in.
    pub fn with_account(self, uid: &str, email: &str, password: &str) -> Self {
        lock(&self.accounts).insert(
            email.to_string(),
            Account {
                identity: Identity::new(uid).with_email(email),
                password: password.to_string(),
            },
        );
        self
    }

    /// Fail the next sign-in, registration or sign-out with `error`.
    pub fn fail_next(&self, error: AuthError) {
        *lock(&self.next_failure) = Some(error);
    }

    /// Publish a signed-in transition directly, skipping credentials.
    pub fn emit_signed_in(&self, identity: Identity) {
        self.hub.publish(Some(identity));
    }

    /// Publish a signed-out transition directly.
    pub fn emit_signed_out(&self) {
        self.hub.publish(None);
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn check_email(&self, email: &str) -> Result<(), AuthError> {
        match &self.email_pattern {
            Some(pattern) if !pattern.is_match(email) => Err(AuthError::InvalidEmail),
            _ => Ok(()),
        }
    }

    fn take_failure(&self) -> Result<(), AuthError> {
        match lock(&self.next_failure).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthProvider for MemoryAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.take_failure()?;
        self.check_email(email)?;
        let account = lock(&self.accounts)
            .get(email)
            .cloned()
            .ok_or(AuthError::UserNotFound)?;
        if account.password != password {
            return Err(AuthError::WrongPassword);
        }
        self.hub.publish(Some(account.identity.clone()));
        Ok(account.identity)
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        self.take_failure()?;
        self.check_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        let identity = {
            let mut accounts = lock(&self.accounts);
            if accounts.contains_key(email) {
                return Err(AuthError::EmailAlreadyInUse);
            }
            let identity = Identity::new(Uuid::now_v7().simple().to_string()).with_email(email);
            accounts.insert(
                email.to_string(),
                Account {
                    identity: identity.clone(),
                    password: password.to_string(),
                },
            );
            identity
        };
        self.hub.publish(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.take_failure()?;
        self.hub.publish(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.hub.current()
    }

    fn on_auth_state_changed(&self) -> AuthSubscription {
        self.hub.subscribe()
    }
}

// ============================================================================
// MEMORY DOCUMENT STORE
// ============================================================================

type DocumentKey = (Collection, String);

/// Document store backed by an ordered map.
///
/// `get` can be paused to hold lookups in flight, and any operation can be
/// made to fail with an injected error.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<DocumentKey, Fields>>,
    get_failure: Mutex<Option<DocumentError>>,
    write_failure: Mutex<Option<DocumentError>>,
    gets: AtomicUsize,
    writes: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            documents: Mutex::new(BTreeMap::new()),
            get_failure: Mutex::new(None),
            write_failure: Mutex::new(None),
            gets: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            gate,
        }
    }

    pub fn insert(&self, collection: Collection, id: &str, fields: Fields) {
        lock(&self.documents).insert((collection, id.to_string()), fields);
    }

    /// Insert a typed record. Records always serialize to objects.
    pub fn insert_record<R: Record>(&self, id: &str, record: &R) {
        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(record) {
            self.insert(R::COLLECTION, id, fields);
        }
    }

    pub fn fields(&self, collection: Collection, id: &str) -> Option<Fields> {
        lock(&self.documents)
            .get(&(collection, id.to_string()))
            .cloned()
    }

    /// Fail every `get` with `error` until cleared with `None`.
    pub fn fail_gets(&self, error: Option<DocumentError>) {
        *lock(&self.get_failure) = error;
    }

    /// Fail every `set` and `update` with `error` until cleared with `None`.
    pub fn fail_writes(&self, error: Option<DocumentError>) {
        *lock(&self.write_failure) = error;
    }

    /// Hold every `get` until [`MemoryDocumentStore::resume_gets`].
    pub fn pause_gets(&self) {
        self.gate.send_replace(true);
    }

    pub fn resume_gets(&self) {
        self.gate.send_replace(false);
    }

    /// Number of `get` calls so far, including paused and failed ones.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of successful `set` and `update` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write_failure(&self) -> Result<(), DocumentError> {
        match lock(&self.write_failure).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, DocumentError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        // Only fails if the sender is gone, which cannot happen while &self lives.
        let _ = gate.wait_for(|paused| !*paused).await;

        if let Some(error) = lock(&self.get_failure).clone() {
            return Err(error);
        }
        Ok(self
            .fields(collection, id)
            .map(|fields| Document::new(id, fields)))
    }

    async fn set(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), DocumentError> {
        self.write_failure()?;
        let mut documents = lock(&self.documents);
        let key = (collection, id.to_string());
        match documents.get_mut(&key) {
            Some(existing) if merge => existing.extend(fields),
            _ => {
                documents.insert(key, fields);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Fields,
    ) -> Result<(), DocumentError> {
        self.write_failure()?;
        let mut documents = lock(&self.documents);
        let existing = documents
            .get_mut(&(collection, id.to_string()))
            .ok_or_else(|| DocumentError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        existing.extend(fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self, collection: Collection, page: PageRequest) -> Result<Page, DocumentError> {
        let documents = lock(&self.documents);
        let mut matching = documents
            .iter()
            .filter(|((c, id), _)| {
                *c == collection
                    && page
                        .start_after
                        .as_deref()
                        .map_or(true, |after| id.as_str() > after)
            })
            .map(|((_, id), fields)| Document::new(id.clone(), fields.clone()));

        let batch: Vec<Document> = matching.by_ref().take(page.limit).collect();
        let more = matching.next().is_some();
        let last_id = if more {
            batch.last().map(|document| document.id.clone())
        } else {
            None
        };
        Ok(Page {
            documents: batch,
            last_id,
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache keys, payloads and stored role values.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Logical cache key in the `<collection>_<suffix>` shape used by the app.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        (
            prop_oneof![
                Just("users"),
                Just("services"),
                Just("bookings"),
                Just("reviews")
            ],
            "[a-z0-9]{1,12}",
        )
            .prop_map(|(collection, suffix)| format!("{collection}_{suffix}"))
    }

    /// JSON payload of the kinds the app caches.
    pub fn arb_payload() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    /// Timestamp with millisecond precision in 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_577_836_800_000i64..1_893_456_000_000i64).prop_map(|ms| {
            chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
        })
    }

    /// TTL between one nanosecond and one day, whole milliseconds or not.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        prop_oneof![
            (1u64..86_400_000).prop_map(Duration::from_millis),
            (1u64..1_000_000).prop_map(Duration::from_nanos),
            (1u64..86_400_000_000).prop_map(Duration::from_micros),
        ]
    }

    /// Raw `role` field as it may appear in a user document.
    pub fn arb_role_value() -> impl Strategy<Value = Option<Value>> {
        prop_oneof![
            Just(None),
            Just(Some(Value::Null)),
            Just(Some(json!("client"))),
            Just(Some(json!("worker"))),
            Just(Some(json!("user"))),
            "[A-Za-z]{0,10}".prop_map(|s| Some(Value::from(s))),
            any::<i32>().prop_map(|n| Some(Value::from(n))),
            Just(Some(json!({ "role": "worker" }))),
        ]
    }

    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        ("[a-zA-Z0-9]{8,28}", proptest::option::of("[a-z]{1,8}@[a-z]{1,8}\\.com")).prop_map(
            |(uid, email)| {
                let identity = Identity::new(uid);
                match email {
                    Some(email) => identity.with_email(email),
                    None => identity,
                }
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use handy_core::Environment;
    use serde_json::Value;

    pub fn identity(uid: &str) -> Identity {
        Identity::new(uid).with_email(format!("{uid}@handy.test"))
    }

    /// A user document with the given raw role field.
    pub fn user_fields(uid: &str, role: Option<Value>) -> Fields {
        let mut fields = Fields::new();
        fields.insert("uid".to_string(), Value::from(uid));
        fields.insert("nombreCompleto".to_string(), Value::from("Test User"));
        fields.insert("email".to_string(), Value::from(format!("{uid}@handy.test")));
        fields.insert("isActive".to_string(), Value::from(true));
        if let Some(role) = role {
            fields.insert("role".to_string(), role);
        }
        fields
    }

    pub fn client_user(uid: &str) -> UserRecord {
        UserRecord {
            uid: uid.to_string(),
            full_name: "Client User".to_string(),
            email: format!("{uid}@handy.test"),
            role: Some(Role::Client),
            is_active: true,
            ..Default::default()
        }
    }

    pub fn worker_user(uid: &str) -> UserRecord {
        UserRecord {
            uid: uid.to_string(),
            full_name: "Worker User".to_string(),
            email: format!("{uid}@handy.test"),
            role: Some(Role::Worker),
            region: "Lisboa".to_string(),
            is_active: true,
            ..Default::default()
        }
    }

    /// Document store seeded with one client (`client-1`) and one worker
    /// (`worker-1`).
    pub fn seeded_documents() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        store.insert_record("client-1", &client_user("client-1"));
        store.insert_record("worker-1", &worker_user("worker-1"));
        store
    }

    pub fn dev_config() -> HandyConfig {
        HandyConfig::for_environment(Environment::Development)
    }
}

// ============================================================================
// TESTS
// ============================================================================
