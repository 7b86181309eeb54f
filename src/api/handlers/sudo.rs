use axum::{
    extract::Extension,
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::types::SudoStatus;
use crate::api::{middleware::back_location, state::AppState};
use crate::gate::{self, state::format_timestamp, GateState};

#[utoipa::path(
    get,
    path = "/v1/sudo",
    responses(
        (status = 200, description = "Step-up status of the current session", body = SudoStatus)
    ),
    tag = "sudo"
)]
/// Read-only: reports whether sudo mode is active without resetting stale state.
pub async fn status(headers: HeaderMap, Extension(state): Extension<Arc<AppState>>) -> Response {
    let now = state.now();
    let duration_seconds = state.gate().config().duration_seconds();
    let session = state.sessions().from_headers(&headers, now).await;

    let status = gate::is_sudo_mode_active(&session, now, duration_seconds).and_then(|active| {
        GateState::load(&session).map(|loaded| SudoStatus {
            active,
            duration_seconds,
            last_verified_at: loaded.last_verified_at.map(format_timestamp),
        })
    });

    match status {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            error!("Failed to read step-up state: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/sudo/exit",
    responses(
        (status = 303, description = "Sudo mode left; redirect to the previous page")
    ),
    tag = "sudo"
)]
/// Leave sudo mode and go back where the request came from.
pub async fn exit(headers: HeaderMap, Extension(state): Extension<Arc<AppState>>) -> Response {
    let mut session = state.sessions().from_headers(&headers, state.now()).await;
    if let Err(err) = gate::exit(&mut session) {
        error!("Failed to leave sudo mode: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    debug!(anonymous = session.is_anonymous(), "Sudo mode exited");
    state.sessions().commit(session, state.now()).await;

    (StatusCode::SEE_OTHER, [(LOCATION, back_location(&headers))]).into_response()
}
