//! crates/kids_learning_core/src/session.rs
//!
//! Session and profile management: wraps the identity provider, keeps one
//! profile document per user, mirrors the signed-in user's role and profile
//! into the local cache, and decides role-based redirects.

use crate::cache::{LocalCache, PROFILE_KEY, ROLE_KEY};
use crate::domain::{AuthUser, Credentials, ProfileHints, Role, SignUpRequest, UserProfile};
use crate::ports::{
    from_document, to_document, DocumentStore, IdentityProvider, PortResult, SetMode,
};
use crate::routing::{Access, Destination, PortalState, Transition};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const USERS_COLLECTION: &str = "users";

pub struct SessionManager {
    identity: Arc<dyn IdentityProvider>,
    documents: Arc<dyn DocumentStore>,
    cache: LocalCache,
    state: Mutex<PortalState>,
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        cache: LocalCache,
    ) -> Self {
        Self {
            identity,
            documents,
            cache,
            state: Mutex::new(PortalState::Unauthenticated),
        }
    }

    /// Runs `handler` for every sign-in state transition published after this call.
    /// Transitions missed while the handler runs collapse into the latest one.
    pub fn observe_session_changes<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(Option<AuthUser>) + Send + 'static,
    {
        let mut changes = self.identity.session_changes();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let user = changes.borrow_and_update().clone();
                handler(user);
            }
        })
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.identity.current_user()
    }

    pub fn state(&self) -> PortalState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, transition: Transition) -> PortalState {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = state.apply(transition);
        if *state != next {
            debug!("portal state {:?} -> {:?}", *state, next);
        }
        *state = next;
        next
    }

    fn cache_profile(&self, profile: &UserProfile) {
        self.cache.put(ROLE_KEY, &profile.role);
        self.cache.put(PROFILE_KEY, profile);
    }

    /// Returns the user's profile, creating the default student profile if none exists.
    /// An existing profile is never overwritten.
    pub async fn ensure_profile(&self, uid: &str, hints: &ProfileHints) -> PortResult<UserProfile> {
        let profile = match self.documents.get(USERS_COLLECTION, uid).await? {
            Some(data) => {
                let mut profile: UserProfile = from_document(data)?;
                if profile.uid.is_empty() {
                    profile.uid = uid.to_string();
                }
                profile
            }
            None => {
                let profile = UserProfile::new_student(uid, hints, Utc::now());
                self.documents
                    .set(USERS_COLLECTION, uid, to_document(&profile)?, SetMode::Replace)
                    .await?;
                info!(uid, "created default student profile");
                profile
            }
        };

        self.cache_profile(&profile);
        Ok(profile)
    }

    /// The user's role, served from the local cache when present.
    ///
    /// A cached role is trusted regardless of age under the default cache
    /// policy; use [`SessionManager::refresh_role`] when freshness matters.
    pub async fn role_of(&self, uid: &str) -> PortResult<Role> {
        if let Some(role) = self.cache.get::<Role>(ROLE_KEY) {
            return Ok(role);
        }
        self.refresh_role(uid).await
    }

    /// Reads the role from the profile document and repopulates the cache.
    pub async fn refresh_role(&self, uid: &str) -> PortResult<Role> {
        let role = match self.documents.get(USERS_COLLECTION, uid).await? {
            Some(data) => match data.get("role").and_then(|v| v.as_str()) {
                Some(raw) => raw.parse::<Role>().unwrap_or_else(|e| {
                    warn!(uid, "{}; treating as student", e);
                    Role::Student
                }),
                None => Role::Student,
            },
            None => Role::Student,
        };
        self.cache.put(ROLE_KEY, &role);
        Ok(role)
    }

    /// The cached profile, if one is present and readable.
    pub fn cached_profile(&self) -> Option<UserProfile> {
        self.cache.get(PROFILE_KEY)
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> PortResult<AuthUser> {
        let mut user = self
            .identity
            .create_account(&request.email, &request.password)
            .await?;

        let display_name = request.display_name.trim();
        if !display_name.is_empty() {
            user = self.identity.update_display_name(display_name).await?;
        }

        let hints = ProfileHints {
            display_name: Some(display_name.to_string()),
        };
        let profile = self.ensure_profile(&user.uid, &hints).await?;
        self.transition(Transition::SignedIn(profile.role));
        info!(uid = %user.uid, "account created");
        Ok(user)
    }

    pub async fn sign_in(&self, credentials: &Credentials) -> PortResult<AuthUser> {
        let user = self
            .identity
            .sign_in(&credentials.email, &credentials.password)
            .await?;

        let hints = ProfileHints {
            display_name: Some(
                user.display_name
                    .clone()
                    .unwrap_or_else(|| "Student".to_string()),
            ),
        };
        let profile = self.ensure_profile(&user.uid, &hints).await?;
        self.transition(Transition::SignedIn(profile.role));
        info!(uid = %user.uid, role = %profile.role, "signed in");
        Ok(user)
    }

    /// Signs out and clears both cached keys, whatever the provider reports.
    pub async fn sign_out(&self) -> PortResult<()> {
        let result = self.identity.sign_out().await;
        self.cache.clear(ROLE_KEY);
        self.cache.clear(PROFILE_KEY);
        self.transition(Transition::SignedOut);
        info!("signed out");
        result
    }

    pub async fn route_to_dashboard(&self) -> PortResult<Destination> {
        let Some(user) = self.current_user() else {
            return Ok(self.transition(Transition::SignedOut).dashboard());
        };
        let role = self.role_of(&user.uid).await?;
        Ok(self.transition(Transition::RoleResolved(role)).dashboard())
    }

    pub async fn require_role(&self, expected: Role) -> PortResult<Access> {
        let Some(user) = self.current_user() else {
            return Ok(self.transition(Transition::SignedOut).admit(expected));
        };
        let role = self.role_of(&user.uid).await?;
        Ok(self.transition(Transition::RoleResolved(role)).admit(expected))
    }
}
