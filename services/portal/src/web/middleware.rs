//! services/portal/src/web/middleware.rs
//!
//! Client identification middleware.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use kids_learning_core::Portal;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::web::state::AppState;

pub const CLIENT_COOKIE: &str = "client";

/// The calling browser, inserted into request extensions.
///
/// Its portal is only registered once a handler asks for it, so requests that
/// never touch page state leave nothing behind.
#[derive(Clone)]
pub struct Client {
    pub id: String,
    state: Arc<AppState>,
}

impl Client {
    /// The client's portal, registering it on first use.
    pub async fn portal(&self) -> Arc<Portal> {
        self.state.portal(&self.id).await
    }

    /// The client's portal if it already has one.
    pub async fn existing_portal(&self) -> Option<Arc<Portal>> {
        self.state.existing_portal(&self.id).await
    }
}

/// Reads the client id from the `client` cookie, if one was sent.
pub fn client_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| cookie.trim().strip_prefix("client="))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Middleware that identifies the caller by its `client` cookie.
///
/// A missing cookie, or one naming a client this process does not know, gets
/// a fresh id. The id is handed back in a `Set-Cookie` header only when the
/// handler registered a portal for it.
pub async fn identify_client(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Reuse a known cookie id or mint a new one
    let mut known = client_id(req.headers());
    if let Some(id) = known.take() {
        if state.is_registered(&id).await {
            known = Some(id);
        } else {
            debug!(client_id = %id, "unknown client cookie; starting fresh");
        }
    }
    let fresh = known.is_none();
    let id = known.unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    // 2. Hand the handler a lazy client
    req.extensions_mut().insert(Client {
        id: id.clone(),
        state: state.clone(),
    });

    // 3. Continue to the handler
    let mut response = next.run(req).await;

    // 4. Hand a new id back to the browser if it now owns a portal
    if fresh && state.is_registered(&id).await {
        let cookie = format!("{}={}; HttpOnly; SameSite=Lax; Path=/", CLIENT_COOKIE, id);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => error!("Failed to build client cookie: {:?}", e),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_found_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; client=abc123; lang=am"),
        );
        assert_eq!(client_id(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_or_missing_client_cookie_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_id(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("client="));
        assert_eq!(client_id(&headers), None);
    }
}
