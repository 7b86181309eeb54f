//! Password login and logout.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info};

use super::types::{ErrorResponse, LoginRequest, UserResponse};
use crate::api::{
    session::{clear_session_cookie, extract_session_token, hash_session_token, session_cookie},
    state::AppState,
    users::AUTH_USER_KEY,
};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = UserResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
/// Start a session. `username` is matched against the configured username
/// attribute (`email` by default).
pub async fn login(
    headers: HeaderMap,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    let attribute = state.gate().config().username_attribute();
    let password = SecretString::from(request.password);

    let user = match state
        .directory()
        .authenticate(attribute, &request.username, &password)
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("invalid_credentials")),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to check credentials: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // A fresh session per login; never keep a token issued before sign-in.
    if let Some(token) = extract_session_token(&headers) {
        state.sessions().destroy(&hash_session_token(&token)).await;
    }

    let values = HashMap::from([(AUTH_USER_KEY.to_string(), Value::String(user.id.clone()))]);
    let token = match state.sessions().create(values, state.now()).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cookie = match session_cookie(state.cookie(), &token) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    info!(user_id = %user.id, "User signed in");
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    (
        StatusCode::OK,
        response_headers,
        Json(UserResponse::from(&user)),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
/// Destroy the session, and with it any step-up state.
pub async fn logout(headers: HeaderMap, Extension(state): Extension<Arc<AppState>>) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        state.sessions().destroy(&hash_session_token(&token)).await;
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state.cookie()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
