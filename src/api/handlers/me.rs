//! Sample sensitive endpoints. All of them run behind `require_sudo`.

use axum::{
    body::Bytes,
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use tracing::info;

use super::types::{ConfirmResponse, EchoField, SudoChallenge, SudoForm, UserResponse};
use crate::api::{form, users::User};
use crate::gate::{decision::NON_ECHOED_FIELDS, echo};

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "The active user", body = UserResponse),
        (status = 401, description = "Step-up required", body = SudoChallenge),
        (status = 303, description = "No active session")
    ),
    tag = "me"
)]
pub async fn me(Extension(user): Extension<User>) -> impl IntoResponse {
    Json(UserResponse::from(&user))
}

#[utoipa::path(
    post,
    path = "/v1/me/confirm",
    request_body(
        content = SudoForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Arbitrary fields plus the optional sudo password"
    ),
    responses(
        (status = 200, description = "Action confirmed; echoes the submitted fields", body = ConfirmResponse),
        (status = 401, description = "Step-up required", body = SudoChallenge),
        (status = 303, description = "No active session")
    ),
    tag = "me"
)]
/// Stand-in for a sensitive write. Returns what it received, minus the
/// password, so clients can check that a replayed request arrived intact.
pub async fn confirm(
    headers: HeaderMap,
    Extension(user): Extension<User>,
    body: Bytes,
) -> impl IntoResponse {
    let fields = form::body_fields(&headers, &body).without(&NON_ECHOED_FIELDS);
    Json(ConfirmResponse {
        user: UserResponse::from(&user),
        fields: EchoField::from_pairs(echo::flatten(&fields)),
    })
}

#[utoipa::path(
    delete,
    path = "/v1/me",
    request_body(
        content = SudoForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Arbitrary fields plus the optional sudo password"
    ),
    responses(
        (status = 200, description = "Account closure confirmed", body = ConfirmResponse),
        (status = 401, description = "Step-up required", body = SudoChallenge),
        (status = 303, description = "No active session")
    ),
    tag = "me"
)]
/// Stand-in for closing the account. Browsers reach it through a `POST`
/// carrying `_method=DELETE`, which is how a challenge form replays it.
pub async fn close(
    headers: HeaderMap,
    Extension(user): Extension<User>,
    body: Bytes,
) -> impl IntoResponse {
    info!(user_id = %user.id, "Account closure confirmed");
    confirm(headers, Extension(user), body).await
}
