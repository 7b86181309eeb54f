//! Acting as another user.
//!
//! Starting a masquerade sits behind the step-up gate. While masquerading,
//! gated routes ask for the real user's password, not the assumed user's.

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use super::types::{ErrorResponse, MasqueradeRequest, SudoChallenge, UserResponse};
use crate::api::{
    form,
    state::AppState,
    users::{DirectoryIdentity, User},
};
use crate::gate::{FieldValue, IdentityProvider, Masqueradable};

fn error_response(status: StatusCode, error: &str) -> Response {
    (status, Json(ErrorResponse::new(error))).into_response()
}

/// Replace the session's active user and commit.
async fn switch_to(state: &AppState, headers: &HeaderMap, user: User) -> Response {
    let mut session = state.sessions().from_headers(headers, state.now()).await;
    if session.is_anonymous() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut identity = DirectoryIdentity::from_session(state.directory(), &session);
    identity.set_active_principal(user.clone());
    let persisted = identity.persist(&mut session);
    state.sessions().commit(session, state.now()).await;

    match persisted {
        Ok(()) => Json(UserResponse::from(&user)).into_response(),
        Err(err) => {
            error!("Failed to switch the active user: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/masquerade",
    request_body = MasqueradeRequest,
    responses(
        (status = 200, description = "Now acting as the target user", body = UserResponse),
        (status = 401, description = "Step-up required", body = SudoChallenge),
        (status = 403, description = "Not allowed to masquerade", body = ErrorResponse),
        (status = 404, description = "Unknown target user", body = ErrorResponse),
        (status = 409, description = "Already masquerading", body = ErrorResponse)
    ),
    tag = "masquerade"
)]
/// Start acting as `user_id`. Accepts JSON or a re-submitted form.
pub async fn start(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<User>,
    body: Bytes,
) -> Response {
    if user.is_masquerading() {
        return error_response(StatusCode::CONFLICT, "already_masquerading");
    }
    if !user.can_masquerade {
        return error_response(StatusCode::FORBIDDEN, "masquerade_not_allowed");
    }

    let fields = form::body_fields(&headers, &body);
    let Some(target_id) = fields
        .get("user_id")
        .and_then(FieldValue::as_text)
        .filter(|id| !id.is_empty())
    else {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "user_id_required");
    };
    if target_id == user.id {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "cannot_masquerade_as_self");
    }
    let Some(target) = state.directory().get(target_id) else {
        return error_response(StatusCode::NOT_FOUND, "unknown_user");
    };

    info!(real_user_id = %user.id, user_id = %target.id, "Masquerade started");
    switch_to(&state, &headers, target.impersonated_by(user)).await
}

#[utoipa::path(
    post,
    path = "/v1/masquerade/stop",
    responses(
        (status = 200, description = "Back to the real user", body = UserResponse),
        (status = 401, description = "No active session"),
        (status = 409, description = "Not masquerading", body = ErrorResponse)
    ),
    tag = "masquerade"
)]
/// Return to the real user.
pub async fn stop(headers: HeaderMap, Extension(state): Extension<Arc<AppState>>) -> Response {
    let session = state.sessions().from_headers(&headers, state.now()).await;
    let identity = DirectoryIdentity::from_session(state.directory(), &session);

    let Some(current) = identity.current_principal() else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let Some(real) = current.masquerading_principal() else {
        return error_response(StatusCode::CONFLICT, "not_masquerading");
    };

    info!(real_user_id = %real.id, user_id = %current.id, "Masquerade stopped");
    switch_to(&state, &headers, real).await
}
