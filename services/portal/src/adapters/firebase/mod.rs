//! services/portal/src/adapters/firebase/mod.rs
//!
//! REST adapters for the hosted Firebase backend: Identity Toolkit for
//! accounts, Cloud Firestore for documents and Cloud Storage for media.
//!
//! The identity adapter holds one browser's session. The document and blob
//! adapters borrow its ID token for every call, so a `Gateway` built here is
//! always per client.

pub mod firestore;
pub mod identity;
pub mod storage;

pub use firestore::FirestoreDocumentStore;
pub use identity::FirebaseIdentityProvider;
pub use storage::FirebaseBlobStore;

use kids_learning_core::ports::{Gateway, PortError, PortResult};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub const IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const STORAGE_BASE_URL: &str = "https://firebasestorage.googleapis.com/v0";

/// The web-app credentials of one Firebase project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirebaseSettings {
    pub api_key: String,
    pub project_id: String,
    pub storage_bucket: String,
}

/// Builds per-client gateways that share one HTTP connection pool.
#[derive(Clone)]
pub struct FirebaseBackend {
    http: reqwest::Client,
    settings: FirebaseSettings,
}

impl FirebaseBackend {
    pub fn new(http: reqwest::Client, settings: FirebaseSettings) -> Self {
        Self { http, settings }
    }

    pub fn settings(&self) -> &FirebaseSettings {
        &self.settings
    }

    /// A fresh signed-out session with its own document and blob adapters.
    pub fn gateway(&self) -> Gateway {
        let identity = Arc::new(FirebaseIdentityProvider::new(
            self.http.clone(),
            IDENTITY_BASE_URL,
            &self.settings.api_key,
        ));
        let documents = Arc::new(FirestoreDocumentStore::new(
            self.http.clone(),
            FIRESTORE_BASE_URL,
            &self.settings.project_id,
            identity.clone(),
        ));
        let blobs = Arc::new(FirebaseBlobStore::new(
            self.http.clone(),
            STORAGE_BASE_URL,
            &self.settings.storage_bucket,
            identity.clone(),
        ));
        Gateway::new(identity, documents, blobs)
    }
}

//=========================================================================================
// Shared request plumbing
//=========================================================================================

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Which port error a failed call turns into.
#[derive(Clone, Copy)]
pub(crate) enum Service {
    Identity,
    Store,
}

/// Extracts the backend's own message from an error body, falling back to
/// the raw body and then to the status line.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => status.to_string(),
    }
}

/// Sends the request and turns a non-success status into a `PortError`.
pub(crate) async fn send(request: RequestBuilder, service: Service) -> PortResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| PortError::Unexpected(format!("request failed: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    debug!(%status, %message, "backend call failed");
    Err(match (status, service) {
        (StatusCode::NOT_FOUND, Service::Store) => PortError::NotFound(message),
        (StatusCode::UNAUTHORIZED, Service::Store) => PortError::Unauthorized,
        (_, Service::Identity) => PortError::Identity(message),
        (_, Service::Store) => PortError::Store(message),
    })
}

/// Decodes a success body as JSON.
pub(crate) async fn json<T: serde::de::DeserializeOwned>(response: Response) -> PortResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| PortError::Unexpected(format!("unreadable response: {}", e)))
}
