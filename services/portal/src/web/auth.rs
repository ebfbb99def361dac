//! services/portal/src/web/auth.rs
//!
//! Authentication endpoints for the signup, login and logout forms.

use crate::web::middleware::Client;
use crate::web::port_failure;
use crate::web::rest::FormResponse;
use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use kids_learning_core::{Button, Credentials, FormResult, SignUpRequest};
use serde::Deserialize;
use utoipa::ToSchema;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub age: u32,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn form_response(result: FormResult, success: StatusCode) -> impl IntoResponse {
    let status = if result.message.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        success
    };
    (status, Json(FormResponse::from(result)))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a student account and sign it in
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = FormResponse),
        (status = 400, description = "The identity service rejected the signup", body = FormResponse)
    )
)]
pub async fn signup_handler(
    Extension(client): Extension<Client>,
    Json(req): Json<SignupRequest>,
) -> impl IntoResponse {
    let request = SignUpRequest {
        email: req.email,
        password: req.password,
        display_name: req.display_name,
        age: req.age,
    };
    let result = client.portal().await.submit_signup(&request).await;
    form_response(result, StatusCode::CREATED)
}

/// POST /auth/login - Sign in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = FormResponse),
        (status = 400, description = "The identity service rejected the credentials", body = FormResponse)
    )
)]
pub async fn login_handler(
    Extension(client): Extension<Client>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let credentials = Credentials {
        email: req.email,
        password: req.password,
    };
    let result = client.portal().await.submit_login(&credentials).await;
    form_response(result, StatusCode::OK)
}

/// POST /auth/logout - Sign out; the client keeps its portal and cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Signed out"),
        (status = 502, description = "The identity service failed; local state was still cleared")
    )
)]
pub async fn logout_handler(
    Extension(client): Extension<Client>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // A client without a portal has nobody signed in.
    if let Some(portal) = client.existing_portal().await {
        portal
            .press(Button::Logout)
            .await
            .map_err(|e| port_failure("Failed to sign out", e))?;
    }
    Ok(StatusCode::NO_CONTENT)
}
