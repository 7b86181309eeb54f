use crate::api::handlers::{auth, health, masquerade, me, sudo};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApi, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, mut doc) = public_router().split_for_parts();
    let (_router, gated) = gated_router().split_for_parts();
    doc.merge(gated);
    doc.tags = Some(tags());
    doc
}

/// Routes reachable without a recent password check.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
pub(crate) fn public_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login))
        .routes(routes!(auth::logout))
        .routes(routes!(sudo::status))
        .routes(routes!(sudo::exit))
        .routes(routes!(masquerade::stop))
}

/// Routes served behind `require_sudo`.
pub(crate) fn gated_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(masquerade::start))
        .routes(routes!(me::me, me::close))
        .routes(routes!(me::confirm))
}

fn tags() -> Vec<Tag> {
    [
        ("health", "Service status"),
        ("auth", "Password sessions"),
        ("sudo", "Step-up re-authentication state"),
        ("masquerade", "Acting as another user"),
        ("me", "Sensitive sample endpoints behind the step-up gate"),
    ]
    .into_iter()
    .map(|(name, description)| {
        let mut tag = Tag::new(name);
        tag.description = Some(description.to_string());
        tag
    })
    .collect()
}

fn cargo_openapi() -> OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team Permesi <team@permesi.dev>"),
            (Some("Team Permesi"), Some("team@permesi.dev"))
        );
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("<a@b.c>"), (None, Some("a@b.c")));
        assert_eq!(parse_author("  "), (None, None));
    }

    #[test]
    fn openapi_documents_public_and_gated_routes() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/logout",
            "/v1/sudo",
            "/v1/sudo/exit",
            "/v1/masquerade",
            "/v1/masquerade/stop",
            "/v1/me",
            "/v1/me/confirm",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|components| components.schemas.contains_key("SudoChallenge")));
    }

    #[test]
    fn gated_writes_document_a_form_body() {
        let doc = openapi();
        let confirm = doc
            .paths
            .paths
            .get("/v1/me/confirm")
            .and_then(|item| item.post.as_ref())
            .and_then(|operation| operation.request_body.as_ref());
        let close = doc
            .paths
            .paths
            .get("/v1/me")
            .and_then(|item| item.delete.as_ref())
            .and_then(|operation| operation.request_body.as_ref());

        for body in [confirm, close] {
            assert!(body.is_some_and(|body| body
                .content
                .contains_key("application/x-www-form-urlencoded")));
        }
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|components| components.schemas.contains_key("SudoForm")));
    }
}
