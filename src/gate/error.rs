//! Error and validation types produced by the gate.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure talking to the session backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Failure inside the identity provider (not a wrong password).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
    #[error("stored credential is malformed: {0}")]
    MalformedCredential(String),
}

/// Fatal errors that cross the gate boundary.
///
/// Expected outcomes (missing user, bad password) are decisions, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("sudo duration must be a positive number of seconds, got {0}")]
    InvalidDuration(i64),
    #[error("invalid username attribute: {0:?}")]
    InvalidUsernameAttribute(String),
}

/// Why a request could not be gated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    #[error("no active user")]
    NoActivePrincipal,
}

/// Recoverable problems with a credential submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("The password field is required.")]
    PasswordRequired,
    // Same message for unknown user and wrong password.
    #[error("These credentials do not match our records.")]
    PasswordInvalid,
}

/// Field name to validation error, one error per field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, ValidationError>);

impl ValidationErrors {
    /// Record an error for `field`, replacing any earlier one.
    pub fn insert(&mut self, field: &str, error: ValidationError) {
        self.0.insert(field.to_string(), error);
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<ValidationError> {
        self.0.get(field).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Human readable messages keyed by field.
    #[must_use]
    pub fn messages(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(field, error)| (field.clone(), error.to_string()))
            .collect()
    }
}
