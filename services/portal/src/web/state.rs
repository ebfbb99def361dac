//! services/portal/src/web/state.rs
//!
//! Defines the application's shared state and the per-client portal registry.

use crate::adapters::FirebaseBackend;
use crate::config::{BackendKind, Config};
use crate::error::ApiError;
use kids_learning_core::memory::{
    MemoryAccounts, MemoryBlobStore, MemoryDocumentStore, MemoryIdentityProvider,
    MemoryKeyValueStore,
};
use kids_learning_core::{Gateway, Portal};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

//=========================================================================================
// Backend
//=========================================================================================

/// The remote services every client's gateway is built from.
pub enum Backend {
    Firebase(FirebaseBackend),
    /// Accounts, documents and blobs shared by all clients of this process.
    Memory {
        accounts: Arc<MemoryAccounts>,
        documents: Arc<MemoryDocumentStore>,
        blobs: Arc<MemoryBlobStore>,
    },
}

impl Backend {
    pub fn memory() -> Self {
        Backend::Memory {
            accounts: MemoryAccounts::new(),
            documents: Arc::new(MemoryDocumentStore::new()),
            blobs: Arc::new(MemoryBlobStore::default()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        match (config.backend, &config.firebase) {
            (BackendKind::Memory, _) => Ok(Self::memory()),
            (BackendKind::Firebase, Some(settings)) => {
                let http = reqwest::Client::builder().build()?;
                Ok(Backend::Firebase(FirebaseBackend::new(http, settings.clone())))
            }
            (BackendKind::Firebase, None) => Err(ApiError::Internal(
                "the firebase backend needs FIREBASE_* settings".to_string(),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Firebase(_) => "firebase",
            Backend::Memory { .. } => "memory",
        }
    }

    /// A gateway with its own signed-out session.
    pub fn gateway(&self) -> Gateway {
        match self {
            Backend::Firebase(firebase) => firebase.gateway(),
            Backend::Memory {
                accounts,
                documents,
                blobs,
            } => Gateway::new(
                Arc::new(MemoryIdentityProvider::new(accounts.clone())),
                documents.clone(),
                blobs.clone(),
            ),
        }
    }
}

//=========================================================================================
// AppState (Shared Across All Clients)
//=========================================================================================

struct ClientEntry {
    portal: Arc<Portal>,
    last_seen: Instant,
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Backend,
    /// One portal per `client` cookie, standing in for one browser each.
    clients: Mutex<HashMap<String, ClientEntry>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, backend: Backend) -> Self {
        info!(backend = backend.name(), "portal backend ready");
        Self {
            config,
            backend,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The client's portal, created on first use of its id.
    pub async fn portal(&self, client_id: &str) -> Arc<Portal> {
        let mut clients = self.clients.lock().await;
        if let Some(entry) = clients.get_mut(client_id) {
            entry.last_seen = Instant::now();
            return entry.portal.clone();
        }

        let portal = Arc::new(Portal::new(
            self.backend.gateway(),
            Arc::new(MemoryKeyValueStore::new()),
            self.config.portal_settings(),
        ));
        clients.insert(
            client_id.to_string(),
            ClientEntry {
                portal: portal.clone(),
                last_seen: Instant::now(),
            },
        );
        debug!(client_id, clients = clients.len(), "client registered");
        portal
    }

    /// The client's portal if one is registered. Never creates one.
    pub async fn existing_portal(&self, client_id: &str) -> Option<Arc<Portal>> {
        let mut clients = self.clients.lock().await;
        let entry = clients.get_mut(client_id)?;
        entry.last_seen = Instant::now();
        Some(entry.portal.clone())
    }

    pub async fn is_registered(&self, client_id: &str) -> bool {
        self.clients.lock().await.contains_key(client_id)
    }

    /// Drops every client not seen for at least `max_idle`. Returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, entry| entry.last_seen.elapsed() < max_idle);
        let evicted = before - clients.len();
        if evicted > 0 {
            info!(evicted, remaining = clients.len(), "idle clients evicted");
        }
        evicted
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// Evicts idle clients every `every` until the token is cancelled.
pub async fn sweep_idle_clients(
    state: Arc<AppState>,
    max_idle: Duration,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                state.evict_idle(max_idle).await;
            }
        }
    }
    debug!("client sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        let config = Config::from_lookup(|name| {
            (name == "PORTAL_BACKEND").then(|| "memory".to_string())
        })
        .unwrap();
        AppState::new(Arc::new(config), Backend::memory())
    }

    #[tokio::test]
    async fn existing_portal_never_registers() {
        let state = state();
        assert!(state.existing_portal("nobody").await.is_none());
        assert_eq!(state.client_count().await, 0);

        let portal = state.portal("c1").await;
        let again = state.existing_portal("c1").await.unwrap();
        assert!(Arc::ptr_eq(&portal, &again));
        assert!(state.is_registered("c1").await);
    }

    #[tokio::test]
    async fn idle_clients_are_evicted() {
        let state = state();
        state.portal("c1").await;
        state.portal("c2").await;

        assert_eq!(state.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(state.client_count().await, 2);
        assert_eq!(state.evict_idle(Duration::ZERO).await, 2);
        assert_eq!(state.client_count().await, 0);
    }
}
