//! services/portal/src/adapters/firebase/storage.rs
//!
//! Lesson media in Cloud Storage for Firebase. Download URLs carry the
//! object's download token, so they work without further credentials.

use super::identity::FirebaseIdentityProvider;
use super::{json, send, Service};
use async_trait::async_trait;
use bytes::Bytes;
use kids_learning_core::ports::{BlobHandle, BlobStore, PortError, PortResult};
use reqwest::{header::CONTENT_TYPE, RequestBuilder, Url};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    /// Comma-separated when an object has several tokens.
    #[serde(default)]
    download_tokens: Option<String>,
}

impl ObjectMetadata {
    fn handle(self) -> BlobHandle {
        let token = self
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        BlobHandle {
            path: self.name,
            token,
        }
    }
}

pub struct FirebaseBlobStore {
    http: reqwest::Client,
    bucket_url: String,
    identity: Arc<FirebaseIdentityProvider>,
}

impl FirebaseBlobStore {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        bucket: &str,
        identity: Arc<FirebaseIdentityProvider>,
    ) -> Self {
        Self {
            http,
            bucket_url: format!("{}/b/{}/o", base_url.trim_end_matches('/'), bucket),
            identity,
        }
    }

    /// The object's URL, with the whole path as one escaped segment.
    fn object_url(&self, path: &str) -> PortResult<Url> {
        let mut url = Url::parse(&self.bucket_url)
            .map_err(|e| PortError::Unexpected(format!("bad storage URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PortError::Unexpected("storage URL cannot take a path".to_string()))?
            .push(path);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.identity.id_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Public download URL for an object with a known token.
    pub fn download_url(&self, path: &str, token: &str) -> PortResult<String> {
        let mut url = self.object_url(path)?;
        url.query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", token);
        Ok(url.to_string())
    }
}

#[async_trait]
impl BlobStore for FirebaseBlobStore {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: Option<&str>) -> PortResult<BlobHandle> {
        let size = bytes.len();
        let request = self
            .http
            .post(&self.bucket_url)
            .query(&[("uploadType", "media"), ("name", path)])
            .header(CONTENT_TYPE, content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
            .body(bytes);
        let metadata: ObjectMetadata =
            json(send(self.authorized(request), Service::Store).await?).await?;
        info!(path, size, "media stored");
        Ok(metadata.handle())
    }

    async fn resolve_url(&self, handle: &BlobHandle) -> PortResult<String> {
        if let Some(token) = &handle.token {
            return self.download_url(&handle.path, token);
        }
        let request = self.http.get(self.object_url(&handle.path)?);
        let metadata: ObjectMetadata =
            json(send(self.authorized(request), Service::Store).await?).await?;
        let resolved = metadata.handle();
        let token = resolved
            .token
            .ok_or_else(|| PortError::Store(format!("no download token for {}", handle.path)))?;
        self.download_url(&handle.path, &token)
    }

    async fn delete(&self, handle: &BlobHandle) -> PortResult<()> {
        let request = self.http.delete(self.object_url(&handle.path)?);
        send(self.authorized(request), Service::Store).await?;
        Ok(())
    }
}
