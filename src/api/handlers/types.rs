//! Request/response types shared by the handlers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::api::users::User;
use crate::gate::{Challenge, PASSWORD_FIELD};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MasqueradeRequest {
    pub user_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    /// Set while the real user behind this session is someone else.
    pub impersonator_id: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            impersonator_id: user.impersonator().map(|real| real.id.clone()),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SudoStatus {
    pub active: bool,
    pub duration_seconds: i64,
    /// UTC, `YYYY-MM-DD HH:MM:SS`.
    pub last_verified_at: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EchoField {
    pub name: String,
    pub value: String,
}

impl EchoField {
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Vec<Self> {
        pairs
            .into_iter()
            .map(|(name, value)| Self { name, value })
            .collect()
    }
}

/// Body of a `401` from a gated route: everything a client needs to render
/// the password prompt and replay the original request.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SudoChallenge {
    pub error: String,
    pub errors: BTreeMap<String, String>,
    pub method: String,
    pub url: String,
    pub form_method: String,
    pub password_field: String,
    pub fields: Vec<EchoField>,
}

impl From<&Challenge> for SudoChallenge {
    fn from(challenge: &Challenge) -> Self {
        Self {
            error: "sudo_required".to_string(),
            errors: challenge.errors.messages(),
            method: challenge.method.to_string(),
            url: challenge.url.clone(),
            form_method: challenge.form_method.to_string(),
            password_field: PASSWORD_FIELD.to_string(),
            fields: EchoField::from_pairs(challenge.echoed_fields()),
        }
    }
}

/// Form body of a gated write. Any other field is accepted and echoed back.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SudoForm {
    /// Re-entered password; only needed when sudo mode is not fresh.
    #[serde(default)]
    pub sudo_password: Option<String>,
    /// Real verb of a replayed request, e.g. `DELETE`.
    #[serde(default, rename = "_method")]
    pub method: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmResponse {
    pub user: UserResponse,
    pub fields: Vec<EchoField>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}
