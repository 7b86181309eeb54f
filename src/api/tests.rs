//! End-to-end tests through the full router.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, REFERER, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use super::{
    handlers::types::{ConfirmResponse, EchoField, SudoChallenge, SudoStatus, UserResponse},
    form::MAX_BODY_BYTES,
    middleware::SUDO_ERROR_HEADER,
    router,
    session::{CookieConfig, SESSION_COOKIE_NAME},
    users::tests::directory,
    AppState,
};
use crate::gate::{state::parse_timestamp, Clock, Gate, GateConfig};

const FORM: &str = "application/x-www-form-urlencoded";

struct SteppingClock(Mutex<DateTime<Utc>>);

impl SteppingClock {
    fn advance(&self, seconds: i64) {
        if let Ok(mut now) = self.0.lock() {
            *now += Duration::seconds(seconds);
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.lock().map(|now| *now).unwrap_or_default()
    }
}

struct Harness {
    app: Router,
    clock: Arc<SteppingClock>,
}

impl Harness {
    fn new(config: GateConfig) -> Result<Self> {
        let start = parse_timestamp("2024-06-01 10:00:00").context("start time")?;
        let clock = Arc::new(SteppingClock(Mutex::new(start)));
        let state = AppState::new(Gate::new(config), directory()?, CookieConfig::new())
            .with_clock(clock.clone());
        Ok(Self {
            app: router(Arc::new(state)),
            clock,
        })
    }

    async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.app.clone().oneshot(request).await?)
    }

    /// Sign in and return the raw session token.
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        let response = self
            .send(
                Request::post("/v1/auth/login")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({"username": username, "password": password}).to_string(),
                    ))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .context("login sets a cookie")?;
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix(&format!("{SESSION_COOKIE_NAME}=")))
            .map(str::to_string)
            .context("session cookie value")
    }

    async fn get(&self, uri: &str, token: &str) -> Result<Response> {
        self.send(
            Request::get(uri)
                .header("host", "app.test")
                .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                .body(Body::empty())?,
        )
        .await
    }

    async fn post_form(&self, uri: &str, token: &str, form: &str) -> Result<Response> {
        self.send(
            Request::post(uri)
                .header("host", "app.test")
                .header(CONTENT_TYPE, FORM)
                .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                .body(Body::from(form.to_string()))?,
        )
        .await
    }

    async fn post_json(&self, uri: &str, token: &str, body: &Value) -> Result<Response> {
        self.send(
            Request::post(uri)
                .header("host", "app.test")
                .header(CONTENT_TYPE, "application/json")
                .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                .body(Body::from(body.to_string()))?,
        )
        .await
    }

    async fn sudo_status(&self, token: &str) -> Result<SudoStatus> {
        read_json(self.get("/v1/sudo", token).await?).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn challenge(response: Response) -> Result<SudoChallenge> {
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    read_json(response).await
}

fn field(name: &str, value: &str) -> EchoField {
    EchoField {
        name: name.to_string(),
        value: value.to_string(),
    }
}

#[tokio::test]
async fn health_reports_name_and_request_id() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let response = harness
        .send(Request::get("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = read_json(response).await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}

#[tokio::test]
async fn login_rejects_wrong_password() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let response = harness
        .send(
            Request::post("/v1/auth/login")
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"username": "ana@example.com", "password": "nope"}).to_string(),
                ))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!response.headers().contains_key(SET_COOKIE));
    Ok(())
}

#[tokio::test]
async fn gated_route_without_session_redirects_back() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let response = harness
        .send(
            Request::post("/v1/me/confirm")
                .header(REFERER, "https://app.test/settings")
                .header(CONTENT_TYPE, FORM)
                .body(Body::from("sudo_password=admin-pw"))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).map(|v| v.as_bytes()),
        Some(&b"https://app.test/settings"[..])
    );
    assert_eq!(
        response.headers().get(SUDO_ERROR_HEADER).map(|v| v.as_bytes()),
        Some(&b"no active user"[..])
    );
    Ok(())
}

#[tokio::test]
async fn first_visit_is_challenged_without_errors() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    let prompt = challenge(harness.get("/v1/me?tab=security", &token).await?).await?;
    assert_eq!(prompt.error, "sudo_required");
    assert!(prompt.errors.is_empty());
    assert_eq!(prompt.method, "GET");
    assert_eq!(prompt.form_method, "GET");
    assert_eq!(prompt.url, "http://app.test/v1/me?tab=security");
    assert_eq!(prompt.password_field, "sudo_password");
    assert_eq!(prompt.fields, vec![field("tab", "security")]);
    Ok(())
}

#[tokio::test]
async fn write_without_password_is_required_error() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    let prompt = challenge(
        harness
            .post_form("/v1/me/confirm", &token, "reason=cleanup&_token=csrf")
            .await?,
    )
    .await?;
    assert_eq!(
        prompt.errors.get("password").map(String::as_str),
        Some("The password field is required.")
    );
    assert_eq!(prompt.fields, vec![field("reason", "cleanup")]);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_rejected_and_state_untouched() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    let prompt = challenge(
        harness
            .post_form("/v1/me/confirm", &token, "sudo_password=wrong")
            .await?,
    )
    .await?;
    assert_eq!(
        prompt.errors.get("password").map(String::as_str),
        Some("These credentials do not match our records.")
    );

    let status = harness.sudo_status(&token).await?;
    assert!(!status.active);
    assert_eq!(status.last_verified_at, None);
    Ok(())
}

#[tokio::test]
async fn correct_password_forwards_and_opens_the_window() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    let response = harness
        .post_form(
            "/v1/me/confirm",
            &token,
            "sudo_password=ana-pw&reason=cleanup&tags[]=a",
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let confirmed: ConfirmResponse = read_json(response).await?;
    assert_eq!(confirmed.user.id, "ana");
    assert_eq!(
        confirmed.fields,
        vec![field("reason", "cleanup"), field("tags[]", "a")]
    );

    let status = harness.sudo_status(&token).await?;
    assert!(status.active);
    assert_eq!(status.last_verified_at.as_deref(), Some("2024-06-01 10:00:00"));

    harness.clock.advance(7200);
    assert_eq!(
        harness.get("/v1/me", &token).await?.status(),
        StatusCode::OK
    );

    harness.clock.advance(1);
    assert!(!harness.sudo_status(&token).await?.active);
    challenge(harness.get("/v1/me", &token).await?).await?;
    Ok(())
}

#[tokio::test]
async fn json_resubmission_is_accepted() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;
    let response = harness
        .post_json(
            "/v1/me/confirm",
            &token,
            &json!({"sudo_password": "ana-pw", "profile": {"name": "Ana"}}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let confirmed: ConfirmResponse = read_json(response).await?;
    assert_eq!(confirmed.fields, vec![field("profile[name]", "Ana")]);
    Ok(())
}

#[tokio::test]
async fn challenge_for_delete_replays_through_method_override() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    let prompt = challenge(
        harness
            .send(
                Request::delete("/v1/me")
                    .header("host", "app.test")
                    .header(CONTENT_TYPE, FORM)
                    .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                    .body(Body::from("reason=moving"))?,
            )
            .await?,
    )
    .await?;
    assert_eq!(prompt.method, "DELETE");
    assert_eq!(prompt.form_method, "POST");
    assert_eq!(
        prompt.fields,
        vec![field("reason", "moving"), field("_method", "DELETE")]
    );

    // What a browser sends when the prompt form is submitted.
    let mut replay = url::form_urlencoded::Serializer::new(String::new());
    for echoed in &prompt.fields {
        replay.append_pair(&echoed.name, &echoed.value);
    }
    replay.append_pair(&prompt.password_field, "ana-pw");

    let response = harness
        .post_form("/v1/me", &token, &replay.finish())
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let confirmed: ConfirmResponse = read_json(response).await?;
    assert_eq!(confirmed.fields, vec![field("reason", "moving")]);
    Ok(())
}

#[tokio::test]
async fn exit_redirects_back_and_closes_the_window() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;
    harness
        .post_form("/v1/me/confirm", &token, "sudo_password=ana-pw")
        .await?;
    assert!(harness.sudo_status(&token).await?.active);

    let response = harness
        .send(
            Request::post("/v1/sudo/exit")
                .header(REFERER, "/account")
                .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).map(|v| v.as_bytes()),
        Some(&b"/account"[..])
    );

    let status = harness.sudo_status(&token).await?;
    assert!(!status.active);
    assert_eq!(status.last_verified_at, None);
    challenge(harness.get("/v1/me", &token).await?).await?;
    Ok(())
}

#[tokio::test]
async fn masquerade_checks_the_real_users_password() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("admin@example.com", "admin-pw").await?;

    let response = harness
        .post_json(
            "/v1/masquerade",
            &token,
            &json!({"user_id": "ana", "sudo_password": "admin-pw"}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let acting: UserResponse = read_json(response).await?;
    assert_eq!(acting.id, "ana");
    assert_eq!(acting.impersonator_id.as_deref(), Some("admin"));

    harness
        .send(
            Request::post("/v1/sudo/exit")
                .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                .body(Body::empty())?,
        )
        .await?;

    // The assumed user's own password does not unlock anything.
    let prompt = challenge(
        harness
            .post_form("/v1/me/confirm", &token, "sudo_password=ana-pw")
            .await?,
    )
    .await?;
    assert!(prompt.errors.contains_key("password"));

    let response = harness
        .post_form("/v1/me/confirm", &token, "sudo_password=admin-pw")
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let confirmed: ConfirmResponse = read_json(response).await?;
    assert_eq!(confirmed.user.id, "ana");
    assert_eq!(confirmed.user.impersonator_id.as_deref(), Some("admin"));

    let response = harness.post_json("/v1/masquerade/stop", &token, &json!({})).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let back: UserResponse = read_json(response).await?;
    assert_eq!(back.id, "admin");
    assert_eq!(back.impersonator_id, None);
    Ok(())
}

#[tokio::test]
async fn masquerade_requires_permission() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    let response = harness
        .post_json(
            "/v1/masquerade",
            &token,
            &json!({"user_id": "admin", "sudo_password": "ana-pw"}),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness.post_json("/v1/masquerade/stop", &token, &json!({})).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn masquerade_only_mode_lets_regular_users_through() -> Result<()> {
    let harness = Harness::new(GateConfig::new().with_prompt_only_while_masquerading(true))?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    assert_eq!(harness.get("/v1/me", &token).await?.status(), StatusCode::OK);
    assert!(!harness.sudo_status(&token).await?.active);
    Ok(())
}

#[tokio::test]
async fn username_attribute_drives_login_and_verification() -> Result<()> {
    let harness =
        Harness::new(GateConfig::new().with_username_attribute("username".to_string()))?;
    let token = harness.login("ana", "ana-pw").await?;

    let response = harness
        .post_form("/v1/me/confirm", &token, "sudo_password=ana-pw")
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn trusted_proxy_headers_shape_the_challenge_url() -> Result<()> {
    let harness = Harness::new(GateConfig::new().with_trust_proxy_headers(true))?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    let response = harness
        .send(
            Request::get("/v1/me")
                .header("host", "10.0.0.7:8080")
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-host", "app.example.com")
                .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                .body(Body::empty())?,
        )
        .await?;
    let prompt = challenge(response).await?;
    assert_eq!(prompt.url, "https://app.example.com/v1/me");
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_session() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;
    harness
        .post_form("/v1/me/confirm", &token, "sudo_password=ana-pw")
        .await?;

    let response = harness
        .send(
            Request::post("/v1/auth/logout")
                .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(
        harness.get("/v1/me", &token).await?.status(),
        StatusCode::SEE_OTHER
    );
    assert!(!harness.sudo_status(&token).await?.active);
    Ok(())
}

#[tokio::test]
async fn oversized_bodies_are_payload_too_large() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    // A form goes through the method override first; a raw body reaches the gate.
    for content_type in [FORM, "application/octet-stream"] {
        let response = harness
            .send(
                Request::post("/v1/me/confirm")
                    .header("host", "app.test")
                    .header(CONTENT_TYPE, content_type)
                    .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                    .body(Body::from(vec![b'a'; MAX_BODY_BYTES + 1]))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE, "{content_type}");
    }
    Ok(())
}

#[tokio::test]
async fn broken_bodies_are_bad_requests() -> Result<()> {
    let harness = Harness::new(GateConfig::new())?;
    let token = harness.login("ana@example.com", "ana-pw").await?;

    for content_type in [FORM, "application/octet-stream"] {
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"note=")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let response = harness
            .send(
                Request::post("/v1/me/confirm")
                    .header("host", "app.test")
                    .header(CONTENT_TYPE, content_type)
                    .header(COOKIE, format!("{SESSION_COOKIE_NAME}={token}"))
                    .body(Body::from_stream(chunks))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{content_type}");
    }

    // Neither failure touched the session.
    assert!(!harness.sudo_status(&token).await?.active);
    Ok(())
}
