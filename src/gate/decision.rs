use axum::http::Method;

use super::{
    echo,
    error::{DenyReason, ValidationErrors},
    request::{GateRequest, InputFields},
};

/// Field carrying the step-up password; shared with the challenge surface.
pub const PASSWORD_FIELD: &str = "sudo_password";
/// Validation errors for the password are reported under this key.
pub const PASSWORD_ERROR_KEY: &str = "password";
/// Method override marker used by re-submitted forms.
pub const METHOD_OVERRIDE_FIELD: &str = "_method";
pub const CSRF_TOKEN_FIELD: &str = "_token";

/// Fields never echoed back into the challenge.
pub const NON_ECHOED_FIELDS: [&str; 3] = [PASSWORD_FIELD, METHOD_OVERRIDE_FIELD, CSRF_TOKEN_FIELD];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Run the downstream handler unmodified.
    Forward,
    /// Present the credential prompt instead of the handler output.
    Challenge(Challenge),
    /// Nobody is signed in; there is no session to step up.
    Denied(DenyReason),
}

impl Decision {
    #[must_use]
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward)
    }
}

/// Everything needed to render the prompt and replay the original request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub errors: ValidationErrors,
    pub input: InputFields,
    pub method: Method,
    pub url: String,
    pub form_method: Method,
}

impl Challenge {
    pub(crate) fn capture<R: GateRequest + ?Sized>(request: &R, errors: ValidationErrors) -> Self {
        let method = request.method().clone();
        Self {
            errors,
            input: request.all_except(&NON_ECHOED_FIELDS),
            form_method: echo::form_method(&method),
            url: request.full_url(),
            method,
        }
    }

    /// Flattened fields for the prompt form, including the method override
    /// when the form cannot use the original verb.
    #[must_use]
    pub fn echoed_fields(&self) -> Vec<(String, String)> {
        let mut fields = echo::flatten(&self.input);
        if self.form_method != self.method && !echo::is_read_method(&self.method) {
            fields.push((METHOD_OVERRIDE_FIELD.to_string(), self.method.to_string()));
        }
        fields
    }
}
