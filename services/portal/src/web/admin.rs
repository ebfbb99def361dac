//! services/portal/src/web/admin.rs
//!
//! The admin lesson editor: the prefilled dialog and the multipart save.

use crate::web::middleware::Client;
use crate::web::{parse_subject, port_failure, see_other};
use axum::{
    extract::{Multipart, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use kids_learning_core::{Access, EditorSubmission, LessonMedia, MediaFile, Portal, Role};
use serde::Deserialize;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
pub struct EditorParams {
    pub id: Option<String>,
    pub subject: Option<String>,
}

/// Checks the admin role; `Some` carries the redirect for everyone else.
async fn require_admin(portal: &Portal) -> Result<Option<Response>, (StatusCode, String)> {
    match portal
        .session()
        .require_role(Role::Admin)
        .await
        .map_err(|e| port_failure("Failed to resolve role", e))?
    {
        Access::Granted => Ok(None),
        Access::Redirect(to) => Ok(Some(see_other(to))),
    }
}

fn bad_multipart(e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("Failed to read multipart data: {}", e);
    (
        StatusCode::BAD_REQUEST,
        format!("Failed to read multipart data: {}", e),
    )
}

/// GET /admin/lessons/editor - The editor dialog, blank or prefilled
#[utoipa::path(
    get,
    path = "/admin/lessons/editor",
    params(
        ("id" = Option<String>, Query, description = "Lesson to edit; omit for a new lesson."),
        ("subject" = Option<String>, Query, description = "The lesson's subject; defaults to the admin grid's subject.")
    ),
    responses(
        (status = 200, description = "The editor form fields"),
        (status = 303, description = "Not an admin"),
        (status = 404, description = "No such lesson")
    )
)]
pub async fn editor_handler(
    Extension(client): Extension<Client>,
    Query(params): Query<EditorParams>,
) -> Result<Response, (StatusCode, String)> {
    let portal = client.portal().await;
    if let Some(redirect) = require_admin(&portal).await? {
        return Ok(redirect);
    }

    let subject = match params.subject.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => parse_subject(raw)?,
        None => portal.settings().admin_subject,
    };
    let lesson = match params.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => Some(
            portal
                .catalog()
                .find_lesson(subject, id)
                .await
                .map_err(|e| port_failure("Failed to load lesson", e))?,
        ),
        None => None,
    };

    Ok(Json(portal.editor().open(lesson.as_ref(), subject)).into_response())
}

/// POST /admin/lessons - Save a lesson from the editor dialog
///
/// Accepts a multipart/form-data request with a `payload` JSON part holding
/// the editor fields and optional `image` and `audio` file parts.
#[utoipa::path(
    post,
    path = "/admin/lessons",
    request_body(content_type = "multipart/form-data", description = "Editor fields plus optional media files."),
    responses(
        (status = 200, description = "Saved; carries the reloaded admin grid"),
        (status = 303, description = "Not an admin"),
        (status = 400, description = "A save step failed; its message is carried verbatim")
    )
)]
pub async fn save_lesson_handler(
    Extension(client): Extension<Client>,
    mut multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let portal = client.portal().await;
    if let Some(redirect) = require_admin(&portal).await? {
        return Ok(redirect);
    }

    let mut submission: Option<EditorSubmission> = None;
    let mut media = LessonMedia::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "payload" => {
                let data = field.bytes().await.map_err(bad_multipart)?;
                let parsed = serde_json::from_slice::<EditorSubmission>(&data).map_err(|e| {
                    (StatusCode::BAD_REQUEST, format!("Invalid editor payload: {}", e))
                })?;
                submission = Some(parsed);
            }
            "image" | "audio" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                // An empty file input still sends a nameless, empty part.
                if file_name.is_empty() || bytes.is_empty() {
                    continue;
                }
                let file = MediaFile {
                    name: file_name,
                    bytes,
                    content_type,
                };
                if name == "image" {
                    media.image = Some(file);
                } else {
                    media.audio = Some(file);
                }
            }
            other => debug!(field = other, "ignoring multipart field"),
        }
    }

    let submission = submission.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "Multipart form must include a payload part".to_string(),
        )
    })?;

    let outcome = portal.editor().submit(&submission, &media).await;
    let status = if outcome.message.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)).into_response())
}
