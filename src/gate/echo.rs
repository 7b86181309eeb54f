//! Echo-back helpers for re-submitting the intercepted request.

use axum::http::{header::HOST, HeaderMap, Method, Uri};

use super::request::{FieldValue, InputFields};

/// Flatten nested input into form entries, preserving order.
///
/// Maps become `name[key]` and lists of scalars `name[]`. A list holding any
/// composite item is written as `name[i]` for every item so the children
/// stay grouped.
#[must_use]
pub fn flatten(fields: &InputFields) -> Vec<(String, String)> {
    let mut flat = Vec::new();
    for (name, value) in fields.iter() {
        flatten_into(name.to_string(), value, &mut flat);
    }
    flat
}

fn flatten_into(key: String, value: &FieldValue, out: &mut Vec<(String, String)>) {
    match value {
        FieldValue::Text(text) => out.push((key, text.clone())),
        FieldValue::List(items) => {
            // One composite item switches the whole list to indexed keys;
            // mixing `name[]` with `name[i]` would not parse back.
            let indexed = items.iter().any(|item| !matches!(item, FieldValue::Text(_)));
            for (index, item) in items.iter().enumerate() {
                match item {
                    FieldValue::Text(text) if !indexed => {
                        out.push((format!("{key}[]"), text.clone()));
                    }
                    _ => flatten_into(format!("{key}[{index}]"), item, out),
                }
            }
        }
        FieldValue::Map(fields) => {
            for (name, child) in fields.iter() {
                flatten_into(format!("{key}[{name}]"), child, out);
            }
        }
    }
}

#[must_use]
pub fn is_read_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// HTML forms only speak GET and POST; every write goes out as POST and
/// carries its real verb in the override field.
#[must_use]
pub fn form_method(method: &Method) -> Method {
    if is_read_method(method) {
        Method::GET
    } else {
        Method::POST
    }
}

/// Rebuild `scheme://host[/prefix]` for the request.
///
/// `X-Forwarded-Proto`, `X-Forwarded-Host` and `X-Forwarded-Prefix` are only
/// honored when the service sits behind a trusted proxy.
#[must_use]
pub fn base_url(headers: &HeaderMap, uri: &Uri, trust_proxy_headers: bool) -> String {
    let forwarded = |name: &str| -> Option<String> {
        if !trust_proxy_headers {
            return None;
        }
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let scheme = forwarded("x-forwarded-proto")
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());

    let host = forwarded("x-forwarded-host")
        .or_else(|| {
            headers
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| uri.authority().map(|authority| authority.as_str().to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    let prefix = forwarded("x-forwarded-prefix")
        .map(|prefix| format!("/{}", prefix.trim_matches('/')))
        .filter(|prefix| prefix != "/")
        .unwrap_or_default();

    format!("{scheme}://{host}{prefix}")
}

/// Full URL for `uri` (path and raw query) under [`base_url`].
#[must_use]
pub fn reconstruct_url(headers: &HeaderMap, uri: &Uri, trust_proxy_headers: bool) -> String {
    let base = base_url(headers, uri, trust_proxy_headers);
    match uri.query().filter(|query| !query.is_empty()) {
        Some(query) => format!("{base}{}?{query}", uri.path()),
        None => format!("{base}{}", uri.path()),
    }
}
