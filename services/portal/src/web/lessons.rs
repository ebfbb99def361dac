//! services/portal/src/web/lessons.rs
//!
//! Subject pages: lesson listing, the lesson-card buttons and quiz submission.

use crate::web::middleware::Client;
use crate::web::{parse_subject, port_failure};
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use kids_learning_core::catalog::next_cursor;
use kids_learning_core::view::{CardAction, LessonCard};
use kids_learning_core::{ListOptions, QuizPresenter, Subject};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use utoipa::ToSchema;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page_size: Option<usize>,
    /// `next_cursor` of the previous page.
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct LessonPage {
    pub subject: Subject,
    pub cards: Vec<LessonCard>,
    pub next_cursor: Option<String>,
}

/// The radio selections of a submitted quiz, keyed by group name (`q0`, `q1`, ...).
#[derive(Debug, Deserialize, ToSchema)]
pub struct QuizAnswers {
    pub subject: String,
    pub lesson_id: String,
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

/// GET /lessons/{subject} - One page of a subject's lessons, newest first
#[utoipa::path(
    get,
    path = "/lessons/{subject}",
    params(
        ("subject" = String, Path, description = "Amharic, Reading, Maths or General (any case)."),
        ("page_size" = Option<usize>, Query, description = "Lessons per page; ignored when the page is cached."),
        ("cursor" = Option<String>, Query, description = "The `next_cursor` of the previous page.")
    ),
    responses(
        (status = 200, description = "Lesson cards and the cursor for the next page"),
        (status = 400, description = "Unknown subject")
    )
)]
pub async fn list_lessons_handler(
    Extension(client): Extension<Client>,
    Path(subject): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subject = parse_subject(&subject)?;
    let portal = client.portal().await;
    let catalog = portal.catalog();
    let options = ListOptions {
        page_size: params.page_size.unwrap_or(catalog.page_size()),
        cursor: params.cursor.filter(|cursor| !cursor.is_empty()),
    };

    let lessons = catalog
        .list_lessons(subject, &options)
        .await
        .map_err(|e| port_failure("Failed to list lessons", e))?;

    Ok(Json(LessonPage {
        subject,
        cards: lessons.iter().map(LessonCard::from).collect(),
        next_cursor: next_cursor(&lessons),
    }))
}

/// POST /lessons/{subject}/{id}/start - The card's Start button
#[utoipa::path(
    post,
    path = "/lessons/{subject}/{id}/start",
    params(
        ("subject" = String, Path, description = "The lesson's subject."),
        ("id" = String, Path, description = "The lesson id.")
    ),
    responses(
        (status = 200, description = "Whether completion was recorded, and the audio to play"),
        (status = 404, description = "No such lesson in this subject")
    )
)]
pub async fn start_lesson_handler(
    Extension(client): Extension<Client>,
    Path((subject, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subject = parse_subject(&subject)?;
    let portal = client.portal().await;
    let lesson = portal
        .catalog()
        .find_lesson(subject, &id)
        .await
        .map_err(|e| port_failure("Failed to find lesson", e))?;

    let outcome = portal
        .card_action(&lesson, CardAction::Start)
        .await
        .map_err(|e| port_failure("Failed to start lesson", e))?;
    Ok(Json(outcome))
}

/// POST /lessons/{subject}/{id}/quiz - The card's Quiz button
///
/// Publishes `open-quiz` on the client's event bus and answers with the form
/// the quiz binding rendered from it.
#[utoipa::path(
    post,
    path = "/lessons/{subject}/{id}/quiz",
    params(
        ("subject" = String, Path, description = "The lesson's subject."),
        ("id" = String, Path, description = "The lesson id.")
    ),
    responses(
        (status = 200, description = "The rendered quiz form"),
        (status = 404, description = "No such lesson in this subject")
    )
)]
pub async fn open_quiz_handler(
    Extension(client): Extension<Client>,
    Path((subject, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subject = parse_subject(&subject)?;
    let portal = client.portal().await;
    let lesson = portal
        .catalog()
        .find_lesson(subject, &id)
        .await
        .map_err(|e| port_failure("Failed to find lesson", e))?;

    let mut binding = QuizPresenter::bind(portal.events());
    portal
        .card_action(&lesson, CardAction::Quiz)
        .await
        .map_err(|e| port_failure("Failed to open quiz", e))?;

    // Other requests of the same client may publish in between.
    while let Some(form) = binding.next_quiz().await {
        if form.lesson_id.as_deref() == Some(id.as_str()) {
            return Ok(Json(form));
        }
        debug!(lesson_id = ?form.lesson_id, "skipping quiz opened elsewhere");
    }
    Err((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Quiz listener closed".to_string(),
    ))
}

/// POST /quiz/submit - Submit a quiz
///
/// Submissions are acknowledged but never scored.
#[utoipa::path(
    post,
    path = "/quiz/submit",
    request_body = QuizAnswers,
    responses(
        (status = 200, description = "The submission acknowledgement"),
        (status = 404, description = "No such lesson in this subject")
    )
)]
pub async fn submit_quiz_handler(
    Extension(client): Extension<Client>,
    Json(req): Json<QuizAnswers>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let subject = parse_subject(&req.subject)?;
    let lesson = client
        .portal()
        .await
        .catalog()
        .find_lesson(subject, &req.lesson_id)
        .await
        .map_err(|e| port_failure("Failed to find lesson", e))?;

    let form = QuizPresenter::render(&lesson);
    Ok(Json(QuizPresenter::submit(&form, &req.answers)))
}
