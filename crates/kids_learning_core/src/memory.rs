//! crates/kids_learning_core/src/memory.rs
//!
//! In-memory implementations of every port. The web host uses them for
//! its offline backend and for each client's local storage; tests use them
//! as fakes. The document store counts reads and writes so callers can
//! assert when the remote store was actually consulted.

use crate::domain::AuthUser;
use crate::ports::{
    BlobHandle, BlobStore, DocumentData, DocumentStore, IdentityProvider, KeyValueStore, PortError,
    PortResult, Query, SetMode, Snapshot, Direction,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::watch;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 6;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"))
}

//=========================================================================================
// Identity
//=========================================================================================

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password_hash: String,
    display_name: Option<String>,
}

impl Account {
    fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            uid: self.uid.clone(),
            email: Some(self.email.clone()),
            display_name: self.display_name.clone(),
        }
    }
}

/// The account registry shared by every client of one in-memory backend.
#[derive(Default)]
pub struct MemoryAccounts {
    by_email: Mutex<HashMap<String, Account>>,
}

impl MemoryAccounts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        lock(&self.by_email).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An identity provider holding one client's session over a shared account registry.
/// Error messages mimic the hosted provider's codes.
pub struct MemoryIdentityProvider {
    accounts: Arc<MemoryAccounts>,
    session: watch::Sender<Option<AuthUser>>,
}

impl MemoryIdentityProvider {
    pub fn new(accounts: Arc<MemoryAccounts>) -> Self {
        let (session, _) = watch::channel(None);
        Self { accounts, session }
    }

    fn publish(&self, user: Option<AuthUser>) {
        self.session.send_replace(user);
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        let email = email.trim().to_lowercase();
        if !email_pattern().is_match(&email) {
            return Err(PortError::Identity("INVALID_EMAIL".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(PortError::Identity(
                "WEAK_PASSWORD : Password should be at least 6 characters".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PortError::Unexpected(format!("failed to hash password: {}", e)))?
            .to_string();

        let account = {
            let mut accounts = lock(&self.accounts.by_email);
            if accounts.contains_key(&email) {
                return Err(PortError::Identity("EMAIL_EXISTS".to_string()));
            }
            let account = Account {
                uid: Uuid::new_v4().simple().to_string(),
                email: email.clone(),
                password_hash,
                display_name: None,
            };
            accounts.insert(email, account.clone());
            account
        };

        let user = account.to_auth_user();
        self.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        let email = email.trim().to_lowercase();
        if !email_pattern().is_match(&email) {
            return Err(PortError::Identity("INVALID_EMAIL".to_string()));
        }
        let account = lock(&self.accounts.by_email)
            .get(&email)
            .cloned()
            .ok_or_else(|| PortError::Identity("INVALID_LOGIN_CREDENTIALS".to_string()))?;

        let parsed = PasswordHash::new(&account.password_hash)
            .map_err(|e| PortError::Unexpected(format!("corrupt password hash: {}", e)))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Err(PortError::Identity("INVALID_LOGIN_CREDENTIALS".to_string()));
        }

        let user = account.to_auth_user();
        self.publish(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.publish(None);
        Ok(())
    }

    async fn update_display_name(&self, display_name: &str) -> PortResult<AuthUser> {
        let current = self.current_user().ok_or(PortError::Unauthorized)?;
        let email = current.email.clone().unwrap_or_default();
        let user = {
            let mut accounts = lock(&self.accounts.by_email);
            let account = accounts
                .get_mut(&email)
                .ok_or_else(|| PortError::Identity("USER_NOT_FOUND".to_string()))?;
            account.display_name = Some(display_name.to_string());
            account.to_auth_user()
        };
        self.publish(Some(user.clone()));
        Ok(user)
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.session.borrow().clone()
    }

    fn session_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session.subscribe()
    }
}

//=========================================================================================
// Documents
//=========================================================================================

/// A document store keeping collections in ordered maps.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, BTreeMap<String, DocumentData>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` and `query` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(AtomicOrdering::SeqCst)
    }

    /// Number of `set`, `update` and `add` calls served so far.
    pub fn writes(&self) -> usize {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    /// Direct inspection of a stored document, without touching the counters.
    pub fn peek(&self, collection: &str, id: &str) -> Option<DocumentData> {
        lock(&self.collections)
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in a collection, without touching the counters.
    pub fn count(&self, collection: &str) -> usize {
        lock(&self.collections)
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<DocumentData>> {
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.peek(collection, id))
    }

    async fn set(&self, collection: &str, id: &str, data: DocumentData, mode: SetMode) -> PortResult<()> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let mut collections = lock(&self.collections);
        let docs = collections.entry(collection.to_string()).or_default();
        match mode {
            SetMode::Replace => {
                docs.insert(id.to_string(), data);
            }
            SetMode::Merge => {
                let existing = docs.entry(id.to_string()).or_default();
                existing.extend(data);
            }
        }
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, partial: DocumentData) -> PortResult<()> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let mut collections = lock(&self.collections);
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| PortError::NotFound(format!("{}/{}", collection, id)))?;
        existing.extend(partial);
        Ok(())
    }

    async fn add(&self, collection: &str, data: DocumentData) -> PortResult<String> {
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        let id = Uuid::new_v4().simple().to_string();
        lock(&self.collections)
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn query(&self, query: &Query) -> PortResult<Vec<Snapshot>> {
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let collections = lock(&self.collections);
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<Snapshot> = docs
            .iter()
            .filter(|(_, data)| {
                query
                    .filters
                    .iter()
                    .all(|filter| data.get(&filter.field) == Some(&filter.value))
            })
            .map(|(id, data)| Snapshot {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some(order) = &query.order_by {
            // Documents without the order-by field are excluded, as the hosted store does.
            matches.retain(|snap| snap.data.contains_key(&order.field));
            matches.sort_by(|a, b| {
                let ordering = compare_values(&a.data[&order.field], &b.data[&order.field]);
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
            if let Some(cursor) = &query.start_after {
                matches.retain(|snap| {
                    let ordering = compare_values(&snap.data[&order.field], cursor);
                    match order.direction {
                        Direction::Ascending => ordering == Ordering::Greater,
                        Direction::Descending => ordering == Ordering::Less,
                    }
                });
            }
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}

//=========================================================================================
// Blobs
//=========================================================================================

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Bytes,
    content_type: Option<String>,
}

/// A blob store that serves objects under a fixed base URL.
pub struct MemoryBlobStore {
    base_url: String,
    objects: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        lock(&self.objects).contains_key(path)
    }

    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes and content type of a stored object.
    pub fn object(&self, path: &str) -> Option<(Bytes, Option<String>)> {
        lock(&self.objects)
            .get(path)
            .map(|blob| (blob.bytes.clone(), blob.content_type.clone()))
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: Option<&str>) -> PortResult<BlobHandle> {
        lock(&self.objects).insert(
            path.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(BlobHandle {
            path: path.to_string(),
            token: None,
        })
    }

    async fn resolve_url(&self, handle: &BlobHandle) -> PortResult<String> {
        if !self.contains(&handle.path) {
            return Err(PortError::NotFound(handle.path.clone()));
        }
        Ok(format!("{}/{}", self.base_url, handle.path))
    }

    async fn delete(&self, handle: &BlobHandle) -> PortResult<()> {
        lock(&self.objects)
            .remove(&handle.path)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(handle.path.clone()))
    }
}

//=========================================================================================
// Local key-value storage
//=========================================================================================

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        lock(&self.entries).insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }

    fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> DocumentData {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn duplicate_and_malformed_accounts_are_rejected() {
        let accounts = MemoryAccounts::new();
        let identity = MemoryIdentityProvider::new(accounts.clone());

        identity.create_account("a@b.com", "secret1").await.unwrap();
        let err = identity.create_account("a@b.com", "secret1").await.unwrap_err();
        assert_eq!(err.to_string(), "EMAIL_EXISTS");

        let err = identity.create_account("not-an-email", "secret1").await.unwrap_err();
        assert_eq!(err.to_string(), "INVALID_EMAIL");

        let err = identity.sign_in("a@b.com", "wrong-pass").await.unwrap_err();
        assert_eq!(err.to_string(), "INVALID_LOGIN_CREDENTIALS");
        assert_eq!(accounts.len(), 1);
    }

    #[tokio::test]
    async fn sessions_are_per_provider_over_shared_accounts() {
        let accounts = MemoryAccounts::new();
        let first = MemoryIdentityProvider::new(accounts.clone());
        let second = MemoryIdentityProvider::new(accounts);

        let user = first.create_account("kid@school.et", "secret1").await.unwrap();
        assert_eq!(first.current_user().map(|u| u.uid), Some(user.uid.clone()));
        assert!(second.current_user().is_none());

        let signed_in = second.sign_in("kid@school.et", "secret1").await.unwrap();
        assert_eq!(signed_in.uid, user.uid);
    }

    #[tokio::test]
    async fn merge_keeps_unrelated_fields_and_replace_does_not() {
        let store = MemoryDocumentStore::new();
        store
            .set("progress", "p", doc(json!({"a": 1, "b": 2})), SetMode::Replace)
            .await
            .unwrap();
        store
            .set("progress", "p", doc(json!({"b": 3})), SetMode::Merge)
            .await
            .unwrap();
        assert_eq!(store.peek("progress", "p").unwrap(), doc(json!({"a": 1, "b": 3})));

        store
            .set("progress", "p", doc(json!({"c": 4})), SetMode::Replace)
            .await
            .unwrap();
        assert_eq!(store.peek("progress", "p").unwrap(), doc(json!({"c": 4})));
    }

    #[tokio::test]
    async fn update_requires_an_existing_document() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update("lessons", "missing", doc(json!({"x": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn query_filters_orders_and_pages() {
        let store = MemoryDocumentStore::new();
        for (title, subject, at) in [
            ("one", "Maths", "2024-01-01T00:00:00Z"),
            ("two", "Maths", "2024-01-02T00:00:00Z"),
            ("three", "Maths", "2024-01-03T00:00:00Z"),
            ("other", "Reading", "2024-01-04T00:00:00Z"),
        ] {
            store
                .add("lessons", doc(json!({"lessonTitle": title, "subject": subject, "createdAt": at})))
                .await
                .unwrap();
        }

        let query = Query::collection("lessons")
            .where_eq("subject", "Maths")
            .order_by("createdAt", Direction::Descending)
            .limit(2);
        let page = store.query(&query).await.unwrap();
        let titles: Vec<_> = page.iter().map(|s| s.data["lessonTitle"].clone()).collect();
        assert_eq!(titles, vec![json!("three"), json!("two")]);

        let next = query.start_after(Some(json!("2024-01-02T00:00:00Z")));
        let page = store.query(&next).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].data["lessonTitle"], json!("one"));
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn blobs_resolve_under_base_url() {
        let blobs = MemoryBlobStore::new("https://cdn.test/");
        let handle = blobs
            .upload("lesson_images/x_cat.png", Bytes::from_static(b"png"), Some("image/png"))
            .await
            .unwrap();
        assert_eq!(
            blobs.resolve_url(&handle).await.unwrap(),
            "https://cdn.test/lesson_images/x_cat.png"
        );
        blobs.delete(&handle).await.unwrap();
        assert!(blobs.resolve_url(&handle).await.is_err());
    }
}
