//! services/portal/src/web/rest.rs
//!
//! Shared response payloads and the master definition for the OpenAPI
//! specification.

use crate::web::{admin, auth, lessons, pages};
use kids_learning_core::FormResult;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        pages::page_handler,
        pages::button_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        lessons::list_lessons_handler,
        lessons::start_lesson_handler,
        lessons::open_quiz_handler,
        lessons::submit_quiz_handler,
        admin::editor_handler,
        admin::save_lesson_handler,
    ),
    components(
        schemas(
            FormResponse,
            RedirectResponse,
            auth::SignupRequest,
            auth::LoginRequest,
            lessons::QuizAnswers,
        )
    ),
    tags(
        (name = "Kids Learning Portal API", description = "Page flows of the children's learning portal.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

/// What a login or signup form shows, and where the browser goes next.
#[derive(Debug, Serialize, ToSchema)]
pub struct FormResponse {
    pub message: String,
    /// `success` or `error`.
    pub kind: String,
    pub redirect: Option<String>,
}

impl From<FormResult> for FormResponse {
    fn from(result: FormResult) -> Self {
        let kind = if result.message.is_error() { "error" } else { "success" };
        Self {
            message: result.message.text,
            kind: kind.to_string(),
            redirect: result.redirect.map(|to| to.path()),
        }
    }
}

/// Where a button press leads. `None` means stay on the current page.
#[derive(Debug, Serialize, ToSchema)]
pub struct RedirectResponse {
    pub redirect: Option<String>,
}
