//! services/portal/src/adapters/firebase/identity.rs
//!
//! Email/password accounts through the Identity Toolkit REST API.

use super::{json, send, Service};
use async_trait::async_trait;
use kids_learning_core::ports::{IdentityProvider, PortError, PortResult};
use kids_learning_core::AuthUser;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

impl AccountResponse {
    fn user(&self) -> AuthUser {
        AuthUser {
            uid: self.local_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone().filter(|name| !name.is_empty()),
        }
    }
}

/// One browser's session with the identity service.
pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    // TODO: exchange the refresh token at securetoken.googleapis.com once the
    // ID token's hour is up; today an expired session must sign in again.
    id_token: Mutex<Option<String>>,
    session: watch::Sender<Option<AuthUser>>,
}

impl FirebaseIdentityProvider {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            id_token: Mutex::new(None),
            session,
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{}", self.base_url, method)
    }

    /// The bearer credential of the signed-in user.
    pub fn id_token(&self) -> Option<String> {
        self.id_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn establish(&self, account: &AccountResponse) -> AuthUser {
        if let Some(token) = &account.id_token {
            *self.id_token.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
                Some(token.clone());
        }
        let user = account.user();
        self.session.send_replace(Some(user.clone()));
        user
    }

    async fn password_call(&self, method: &str, email: &str, password: &str) -> PortResult<AccountResponse> {
        let request = self
            .http
            .post(self.endpoint(method))
            .query(&[("key", self.api_key.as_str())])
            .json(&PasswordRequest {
                email,
                password,
                return_secure_token: true,
            });
        json(send(request, Service::Identity).await?).await
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        let account = self.password_call("signUp", email, password).await?;
        info!(uid = %account.local_id, "account registered");
        Ok(self.establish(&account))
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthUser> {
        let account = self.password_call("signInWithPassword", email, password).await?;
        debug!(uid = %account.local_id, "password sign-in accepted");
        Ok(self.establish(&account))
    }

    async fn sign_out(&self) -> PortResult<()> {
        *self.id_token.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        self.session.send_replace(None);
        Ok(())
    }

    async fn update_display_name(&self, display_name: &str) -> PortResult<AuthUser> {
        let token = self.id_token().ok_or(PortError::Unauthorized)?;
        let request = self
            .http
            .post(self.endpoint("update"))
            .query(&[("key", self.api_key.as_str())])
            .json(&UpdateRequest {
                id_token: &token,
                display_name,
                return_secure_token: true,
            });
        let account: AccountResponse = json(send(request, Service::Identity).await?).await?;
        Ok(self.establish(&account))
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.session.borrow().clone()
    }

    fn session_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.session.subscribe()
    }
}
