//! crates/kids_learning_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the portal's core logic.
//! The hosted backend offers three capabilities (identity, documents, blobs)
//! and the client keeps a small key-value store for cached reads. Each is a
//! port so the core never depends on a concrete SDK.

use crate::domain::AuthUser;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::watch;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// `Identity` and `Store` carry the backend's own message and display it
/// unmodified, so forms can surface it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Identity(String),
    #[error("{0}")]
    Store(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Identity
//=========================================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> PortResult<AuthUser>;

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthUser>;

    async fn sign_out(&self) -> PortResult<()>;

    /// Sets the display name of the signed-in account.
    async fn update_display_name(&self, display_name: &str) -> PortResult<AuthUser>;

    /// The established session, if any. Never blocks.
    fn current_user(&self) -> Option<AuthUser>;

    /// A receiver that observes every sign-in state transition.
    fn session_changes(&self) -> watch::Receiver<Option<AuthUser>>;
}

//=========================================================================================
// Documents
//=========================================================================================

/// The body of a schema-less JSON document.
pub type DocumentData = serde_json::Map<String, serde_json::Value>;

/// A document together with its id, as returned by queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub data: DocumentData,
}

/// How `set` treats fields already present on the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// The stored document becomes exactly the given body.
    Replace,
    /// Only the given top-level fields are written; others are kept.
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// An equality filter on one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    /// Value of the order-by field to resume after.
    pub start_after: Option<serde_json::Value>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            start_after: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, value: Option<serde_json::Value>) -> Self {
        self.start_after = value;
        self
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<DocumentData>>;

    async fn set(&self, collection: &str, id: &str, data: DocumentData, mode: SetMode) -> PortResult<()>;

    /// Writes the given fields onto an existing document. Fails with `NotFound` if absent.
    async fn update(&self, collection: &str, id: &str, partial: DocumentData) -> PortResult<()>;

    /// Inserts a new document and returns the id the store generated for it.
    async fn add(&self, collection: &str, data: DocumentData) -> PortResult<String>;

    async fn query(&self, query: &Query) -> PortResult<Vec<Snapshot>>;
}

//=========================================================================================
// Blobs
//=========================================================================================

/// A reference to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub path: String,
    /// Opaque token some stores need to build a download URL.
    pub token: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: Option<&str>) -> PortResult<BlobHandle>;

    async fn resolve_url(&self, handle: &BlobHandle) -> PortResult<String>;

    async fn delete(&self, handle: &BlobHandle) -> PortResult<()>;
}

//=========================================================================================
// Local key-value persistence
//=========================================================================================

/// String-keyed local storage. Synchronous, like the browser storage it mirrors.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);

    fn keys(&self) -> Vec<String>;
}

//=========================================================================================
// Gateway
//=========================================================================================

/// A single configured handle to the three hosted capabilities.
#[derive(Clone)]
pub struct Gateway {
    pub identity: Arc<dyn IdentityProvider>,
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Gateway {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            identity,
            documents,
            blobs,
        }
    }
}

//=========================================================================================
// Conversions between domain types and document bodies
//=========================================================================================

/// Serializes a value into a document body. The value must serialize to a JSON object.
pub fn to_document<T: serde::Serialize>(value: &T) -> PortResult<DocumentData> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(PortError::Invalid(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(PortError::Invalid(e.to_string())),
    }
}

/// Deserializes a document body into a domain type.
pub fn from_document<T: serde::de::DeserializeOwned>(data: DocumentData) -> PortResult<T> {
    serde_json::from_value(serde_json::Value::Object(data))
        .map_err(|e| PortError::Store(format!("malformed document: {}", e)))
}
