//! Principals, the optional masquerade capability, and credential subjects.
//!
//! When a principal is masquerading, the password check is made against the
//! real (masquerading) principal while the masqueraded one stays the active
//! identity for the rest of the request. The swap is explicit: resolve the
//! subject, verify, then `restore` on both the success and failure paths.

use secrecy::SecretString;
use std::fmt;

use super::error::IdentityError;

/// An authenticated identity as seen by the gate.
pub trait Principal: Clone {
    /// Look up a login attribute by name (for example `email`).
    fn attribute(&self, name: &str) -> Option<String>;

    /// The masquerade capability, for principal types that support it.
    fn as_masqueradable(&self) -> Option<&dyn Masqueradable<Self>> {
        None
    }
}

pub trait Masqueradable<P> {
    fn is_masquerading(&self) -> bool;

    /// The real principal behind the assumed identity.
    fn masquerading_principal(&self) -> Option<P>;
}

/// The login and credential backend.
pub trait IdentityProvider {
    type User: Principal;

    fn current_principal(&self) -> Option<Self::User>;

    /// Check a credential pair. Implementations may switch the active
    /// principal to the verified subject; the gate restores it afterwards.
    ///
    /// # Errors
    /// Returns `IdentityError` when the check itself cannot be performed.
    fn verify(&mut self, credentials: &Credentials) -> Result<bool, IdentityError>;

    fn set_active_principal(&mut self, principal: Self::User);
}

/// Username/password pair for the configured username attribute.
pub struct Credentials {
    attribute: String,
    username: String,
    password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(attribute: &str, username: String, password: SecretString) -> Self {
        Self {
            attribute: attribute.to_string(),
            username,
            password,
        }
    }

    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("attribute", &self.attribute)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Who the password is checked against, and who to re-activate afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialSubject<P> {
    pub subject: P,
    pub restore_target: Option<P>,
}

#[must_use]
pub fn is_masquerading<P: Principal>(principal: &P) -> bool {
    principal
        .as_masqueradable()
        .is_some_and(|capability| capability.is_masquerading())
}

#[must_use]
pub fn resolve_credential_subject<P: Principal>(principal: &P) -> CredentialSubject<P> {
    let real = principal
        .as_masqueradable()
        .filter(|capability| capability.is_masquerading())
        .and_then(|capability| capability.masquerading_principal());

    match real {
        Some(real) => CredentialSubject {
            subject: real,
            restore_target: Some(principal.clone()),
        },
        None => CredentialSubject {
            subject: principal.clone(),
            restore_target: None,
        },
    }
}

pub fn restore<I: IdentityProvider + ?Sized>(identity: &mut I, target: I::User) {
    identity.set_active_principal(target);
}
