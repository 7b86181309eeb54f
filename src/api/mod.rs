use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Extension},
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

pub mod form;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod session;
pub mod state;
pub mod users;

#[cfg(test)]
mod tests;

pub use self::openapi::openapi;
pub use self::state::AppState;

/// Build the service: public routes, gated routes behind `require_sudo`, and
/// the method override in front of routing.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let (public, _) = openapi::public_router().split_for_parts();
    let (gated, _) = openapi::gated_router().split_for_parts();

    let routes = public
        .merge(gated.route_layer(from_fn(middleware::require_sudo)))
        .layer(Extension(state));

    // Routing happens inside `routes`, so the override must wrap it whole.
    let routes = ServiceBuilder::new()
        .layer(from_fn(middleware::method_override))
        .service(routes);

    Router::new().fallback_service(routes).layer(
        ServiceBuilder::new()
            .layer(DefaultBodyLimit::max(form::MAX_BODY_BYTES))
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    )
}

/// Serve until Ctrl-C.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn new(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let method = request.method();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    // Headers carry the session cookie; only the request line is recorded.
    debug_span!("http-request", %method, path, request_id)
}
