//! Request middleware: the step-up gate and HTML-form method override.

use axum::{
    body::{Body, Bytes},
    extract::{Extension, FromRequest, Request},
    http::{
        header::{LOCATION, REFERER},
        request::Parts,
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{
    form,
    handlers::types::SudoChallenge,
    state::AppState,
    users::DirectoryIdentity,
};
use crate::gate::{
    decision::METHOD_OVERRIDE_FIELD, Decision, DenyReason, FieldValue, IdentityProvider,
};

pub const SUDO_ERROR_HEADER: &str = "x-sudo-error";
pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// Gate a route behind a recent password check.
///
/// The body is buffered so the gate can read `sudo_password` and echo the
/// rest; on `Forward` the handler receives the same bytes plus the active
/// `User` as an extension.
pub async fn require_sudo(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match buffer_body(&parts, body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    let now = state.now();
    let input = form::request_input(
        &parts,
        &bytes,
        state.gate().config().trust_proxy_headers(),
    );
    let mut session = state.sessions().from_headers(&parts.headers, now).await;
    let mut identity = DirectoryIdentity::from_session(state.directory(), &session);

    let decision = state
        .gate()
        .evaluate(&input, &mut session, &mut identity, now);
    let user = identity.current_principal();
    let persisted = identity.persist(&mut session);
    state.sessions().commit(session, now).await;

    if let Err(err) = persisted {
        error!("Failed to persist the active user: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match decision {
        Ok(Decision::Forward) => {
            let mut request = Request::from_parts(parts, Body::from(bytes));
            if let Some(user) = user {
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        Ok(Decision::Challenge(challenge)) => (
            StatusCode::UNAUTHORIZED,
            Json(SudoChallenge::from(&challenge)),
        )
            .into_response(),
        Ok(Decision::Denied(reason)) => denied(&parts.headers, reason),
        Err(err) => {
            error!("Step-up gate failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Where "redirect back" goes: the `Referer`, or the site root.
pub(crate) fn back_location(headers: &HeaderMap) -> HeaderValue {
    headers
        .get(REFERER)
        .filter(|value| !value.is_empty())
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("/"))
}

fn denied(headers: &HeaderMap, reason: DenyReason) -> Response {
    let mut response_headers = HeaderMap::new();
    response_headers.insert(LOCATION, back_location(headers));
    if let Ok(value) = HeaderValue::from_str(&reason.to_string()) {
        response_headers.insert(HeaderName::from_static(SUDO_ERROR_HEADER), value);
    }
    (StatusCode::SEE_OTHER, response_headers).into_response()
}

/// Let a `POST` stand in for `PUT`, `PATCH` or `DELETE`.
///
/// The verb comes from the `X-HTTP-Method-Override` header or a `_method`
/// body field. Runs in front of routing so the request reaches the handler
/// registered for the real verb.
pub async fn method_override(request: Request, next: Next) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let from_header = request
        .headers()
        .get(METHOD_OVERRIDE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(overridden_method);
    if let Some(method) = from_header {
        let mut request = request;
        *request.method_mut() = method;
        return next.run(request).await;
    }

    if !form::carries_fields(request.headers()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match buffer_body(&parts, body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    let from_body = form::body_fields(&parts.headers, &bytes)
        .get(METHOD_OVERRIDE_FIELD)
        .and_then(FieldValue::as_text)
        .and_then(overridden_method);
    if let Some(method) = from_body {
        debug!(%method, path = parts.uri.path(), "Method override");
        parts.method = method;
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Read the whole body under the router's `DefaultBodyLimit`. Going over
/// the limit is a 413; a body that fails to arrive is a 400.
async fn buffer_body(parts: &Parts, body: Body) -> Result<Bytes, Response> {
    Bytes::from_request(Request::from_parts(parts.clone(), body), &())
        .await
        .map_err(|rejection| {
            warn!(status = %rejection.status(), "Failed to buffer request body: {rejection}");
            rejection.into_response()
        })
}

fn overridden_method(raw: &str) -> Option<Method> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        _ => None,
    }
}
