//! services/portal/src/web/pages.rs
//!
//! Page bootstrapping and the generic buttons shared by every page.

use crate::web::middleware::Client;
use crate::web::rest::RedirectResponse;
use crate::web::{port_failure, see_other};
use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use kids_learning_core::{Button, PageId, PageOutcome};

/// GET /pages/{page} - Boot a page by its identifier
#[utoipa::path(
    get,
    path = "/pages/{page}",
    params(("page" = String, Path, description = "Page identifier, e.g. `home` or `maths`.")),
    responses(
        (status = 200, description = "The page's view model"),
        (status = 204, description = "Unknown page identifier; nothing to do"),
        (status = 303, description = "Redirect to another page"),
        (status = 502, description = "The hosted backend failed")
    )
)]
pub async fn page_handler(
    Extension(client): Extension<Client>,
    Path(page): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    // Unknown identifiers are a no-op and need no portal.
    if PageId::parse(&page).is_none() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let outcome = client
        .portal()
        .await
        .boot(&page)
        .await
        .map_err(|e| port_failure("Failed to boot page", e))?;

    Ok(match outcome {
        PageOutcome::Render(view) => Json(view).into_response(),
        PageOutcome::Redirect(to) => see_other(to),
        PageOutcome::Ignored => StatusCode::NO_CONTENT.into_response(),
    })
}

/// POST /pages/buttons/{button} - Press one of the generic page buttons
#[utoipa::path(
    post,
    path = "/pages/buttons/{button}",
    params((
        "button" = String,
        Path,
        description = "One of login, signup, dashboard, get-started, explore, logout, to-subjects."
    )),
    responses(
        (status = 200, description = "Where the button leads", body = RedirectResponse),
        (status = 400, description = "Unknown button")
    )
)]
pub async fn button_handler(
    Extension(client): Extension<Client>,
    Path(button): Path<Button>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let destination = client
        .portal()
        .await
        .press(button)
        .await
        .map_err(|e| port_failure("Failed to handle button", e))?;

    Ok(Json(RedirectResponse {
        redirect: destination.map(|to| to.path()),
    }))
}
