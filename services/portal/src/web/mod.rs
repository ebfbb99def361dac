pub mod admin;
pub mod auth;
pub mod lessons;
pub mod middleware;
pub mod pages;
pub mod rest;
pub mod state;

pub use middleware::identify_client;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use kids_learning_core::{Destination, PortError, Subject};
use state::AppState;
use std::sync::Arc;
use tracing::error;

/// Builds the portal's routes. Every route runs behind [`identify_client`].
pub fn router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    Router::new()
        .route("/pages/{page}", get(pages::page_handler))
        .route("/pages/buttons/{button}", post(pages::button_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/lessons/{subject}", get(lessons::list_lessons_handler))
        .route("/lessons/{subject}/{id}/start", post(lessons::start_lesson_handler))
        .route("/lessons/{subject}/{id}/quiz", post(lessons::open_quiz_handler))
        .route("/quiz/submit", post(lessons::submit_quiz_handler))
        .route("/admin/lessons/editor", get(admin::editor_handler))
        .route("/admin/lessons", post(admin::save_lesson_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), identify_client))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

//=========================================================================================
// Shared handler helpers
//=========================================================================================

/// Logs a port failure and maps it to a status and message.
pub(crate) fn port_failure(context: &str, e: PortError) -> (StatusCode, String) {
    error!("{}: {:?}", context, e);
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Invalid(_) | PortError::Identity(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Store(_) => StatusCode::BAD_GATEWAY,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

pub(crate) fn parse_subject(raw: &str) -> Result<Subject, (StatusCode, String)> {
    raw.parse::<Subject>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

/// A `303 See Other` to the destination's page.
pub(crate) fn see_other(to: Destination) -> Response {
    Redirect::to(&to.path()).into_response()
}
