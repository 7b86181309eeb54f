//! Turn an HTTP request into gate input.

use axum::http::{header::CONTENT_TYPE, request::Parts, HeaderMap};
use serde_json::Value;
use tracing::debug;

use crate::gate::{echo, InputFields, RequestInput};

/// Largest body the gate buffers before handing the request on.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyKind {
    Form,
    Json,
    Other,
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if content_type == "application/x-www-form-urlencoded" {
        BodyKind::Form
    } else if content_type == "application/json" || content_type.ends_with("+json") {
        BodyKind::Json
    } else {
        BodyKind::Other
    }
}

/// Whether the body is a form or JSON payload the gate can read fields from.
#[must_use]
pub fn carries_fields(headers: &HeaderMap) -> bool {
    body_kind(headers) != BodyKind::Other
}

/// Fields carried by the body, according to its content type.
#[must_use]
pub fn body_fields(headers: &HeaderMap, body: &[u8]) -> InputFields {
    if body.is_empty() {
        return InputFields::new();
    }
    match body_kind(headers) {
        BodyKind::Form => InputFields::from_urlencoded(body),
        BodyKind::Json => match serde_json::from_slice::<Value>(body) {
            Ok(value) => InputFields::from_json(value),
            Err(err) => {
                debug!("Ignoring unparsable JSON body: {err}");
                InputFields::new()
            }
        },
        BodyKind::Other => InputFields::new(),
    }
}

/// Query string fields overlaid with body fields.
#[must_use]
pub fn request_input(parts: &Parts, body: &[u8], trust_proxy_headers: bool) -> RequestInput {
    let mut fields = parts
        .uri
        .query()
        .map(|query| InputFields::from_urlencoded(query.as_bytes()))
        .unwrap_or_default();
    fields.merge(body_fields(&parts.headers, body));

    let base_url = echo::base_url(&parts.headers, &parts.uri, trust_proxy_headers);
    RequestInput::new(
        parts.method.clone(),
        &base_url,
        parts.uri.path(),
        parts.uri.query(),
    )
    .with_fields(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{FieldValue, GateRequest};
    use axum::{
        body::Body,
        http::{HeaderValue, Request},
    };

    fn parts(request: Request<Body>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn body_wins_over_query() -> anyhow::Result<()> {
        let request = Request::post("/v1/me/confirm?step=1&note=query")
            .header("host", "app.test")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(Body::empty())?;
        let input = request_input(&parts(request), b"note=body&sudo_password=pw", false);

        assert_eq!(input.input("step"), Some(&FieldValue::Text("1".into())));
        assert_eq!(input.input("note"), Some(&FieldValue::Text("body".into())));
        assert!(input.has("sudo_password"));
        assert_eq!(
            input.full_url(),
            "http://app.test/v1/me/confirm?step=1&note=query"
        );
        Ok(())
    }

    #[test]
    fn json_objects_become_fields() -> anyhow::Result<()> {
        let request = Request::post("/v1/masquerade")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::empty())?;
        let input = request_input(
            &parts(request),
            br#"{"user_id":"ana","sudo_password":"pw"}"#,
            false,
        );
        assert_eq!(input.input("user_id"), Some(&FieldValue::Text("ana".into())));
        Ok(())
    }

    #[test]
    fn unknown_or_broken_bodies_carry_no_fields() {
        let mut headers = HeaderMap::new();
        assert!(body_fields(&headers, b"a=1").is_empty());

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(body_fields(&headers, b"{not json").is_empty());
        assert!(body_fields(&headers, b"[1,2]").is_empty());
    }
}
