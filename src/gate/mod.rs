//! Step-up re-authentication gate ("sudo mode").
//!
//! The gate runs in front of sensitive handlers and decides, per request,
//! whether to let it through, to ask for the password again, or to refuse it
//! because nobody is signed in.
//!
//! Flow Overview:
//! 1) No active principal: deny.
//! 2) `prompt_only_while_masquerading` and not masquerading: forward.
//! 3) Stale, inactive or missing verification: reset `sudo_active` and mark
//!    the request as needing a challenge.
//! 4) A `sudo_password` on the request is always checked, fresh or not. The
//!    check runs against the real principal when masquerading; the active
//!    identity is restored on both outcomes. Success wins over step 3.
//! 5) A write request that needs a challenge and carries no password gets a
//!    "password required" error.
//! 6) Challenge carries the original method, URL and non-sensitive input.
//!
//! State lives only in the session store handed to `evaluate`; the gate
//! itself holds nothing but configuration.

pub mod clock;
pub mod config;
pub mod decision;
pub mod echo;
pub mod error;
pub mod identity;
pub mod request;
pub mod state;


pub use clock::{Clock, FixedClock, SystemClock};
pub use config::GateConfig;
pub use decision::{Challenge, Decision, PASSWORD_ERROR_KEY, PASSWORD_FIELD};
pub use error::{
    ConfigError, DenyReason, GateError, IdentityError, SessionError, ValidationError,
    ValidationErrors,
};
pub use identity::{
    resolve_credential_subject, restore, CredentialSubject, Credentials, IdentityProvider,
    Masqueradable, Principal,
};
pub use request::{FieldValue, GateRequest, InputFields, RequestInput};
pub use state::{exit, is_sudo_mode_active, GateState, SessionStore};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default)]
pub struct Gate {
    config: GateConfig,
}

impl Gate {
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide what happens to `request`.
    ///
    /// Reads and writes gate state through `session` only. The store is not
    /// assumed to be transactional: the state is read once, then each change
    /// is written as its own key update.
    ///
    /// # Errors
    /// Returns `GateError` when the session store or identity provider fails.
    pub fn evaluate<R, S, I>(
        &self,
        request: &R,
        session: &mut S,
        identity: &mut I,
        now: DateTime<Utc>,
    ) -> Result<Decision, GateError>
    where
        R: GateRequest + ?Sized,
        S: SessionStore + ?Sized,
        I: IdentityProvider + ?Sized,
    {
        let Some(principal) = identity.current_principal() else {
            warn!("Step-up gate reached without an active user");
            return Ok(Decision::Denied(DenyReason::NoActivePrincipal));
        };

        if self.config.prompt_only_while_masquerading() && !identity::is_masquerading(&principal)
        {
            return Ok(Decision::Forward);
        }

        let gate_state = GateState::load(session)?;
        let mut needs_challenge = !gate_state.is_satisfied(now, self.config.duration_seconds());
        if needs_challenge {
            state::mark_inactive(session)?;
        }

        let mut errors = ValidationErrors::default();
        let submitted = request
            .input(PASSWORD_FIELD)
            .and_then(FieldValue::as_text)
            .filter(|password| !password.is_empty());

        match submitted {
            Some(password) => {
                if self.attempt(&principal, password, session, identity, now)? {
                    needs_challenge = false;
                } else {
                    errors.insert(PASSWORD_ERROR_KEY, ValidationError::PasswordInvalid);
                    needs_challenge = true;
                }
            }
            None if needs_challenge && !echo::is_read_method(request.method()) => {
                errors.insert(PASSWORD_ERROR_KEY, ValidationError::PasswordRequired);
            }
            None => {}
        }

        if !needs_challenge {
            return Ok(Decision::Forward);
        }

        debug!(
            method = %request.method(),
            path = request.path(),
            errors = errors.len(),
            "Step-up challenge required"
        );
        Ok(Decision::Challenge(Challenge::capture(request, errors)))
    }

    /// Check `password` for the credential subject of `principal` and record
    /// a successful verification. Returns whether the check passed.
    fn attempt<S, I>(
        &self,
        principal: &I::User,
        password: &str,
        session: &mut S,
        identity: &mut I,
        now: DateTime<Utc>,
    ) -> Result<bool, GateError>
    where
        S: SessionStore + ?Sized,
        I: IdentityProvider + ?Sized,
    {
        let CredentialSubject {
            subject,
            restore_target,
        } = resolve_credential_subject(principal);
        let substituted = restore_target.is_some();
        if substituted {
            identity.set_active_principal(subject.clone());
        }

        let attribute = self.config.username_attribute();
        let outcome = match subject.attribute(attribute) {
            Some(username) => identity.verify(&Credentials::new(
                attribute,
                username,
                SecretString::from(password.to_string()),
            )),
            None => {
                warn!("Credential subject has no {attribute} attribute; rejecting step-up");
                Ok(false)
            }
        };

        // Whatever happened, the identity that was live before the check must be live again.
        match (&outcome, restore_target) {
            (Ok(true), Some(target)) => restore(identity, target),
            (Ok(true), None) => {}
            (_, target) => restore(identity, target.unwrap_or_else(|| principal.clone())),
        }

        let verified = outcome?;
        if verified {
            state::mark_verified(session, now)?;
            info!(masquerading = substituted, "Step-up verification succeeded");
        } else {
            info!(masquerading = substituted, "Step-up verification failed");
        }
        Ok(verified)
    }
}
