use regex::Regex;

use super::error::ConfigError;

pub const DEFAULT_DURATION_SECONDS: i64 = 2 * 60 * 60;
pub const DEFAULT_USERNAME_ATTRIBUTE: &str = "email";

/// Process-wide gate settings, read-only once the server is running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateConfig {
    duration_seconds: i64,
    username_attribute: String,
    prompt_only_while_masquerading: bool,
    trust_proxy_headers: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl GateConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            duration_seconds: DEFAULT_DURATION_SECONDS,
            username_attribute: DEFAULT_USERNAME_ATTRIBUTE.to_string(),
            prompt_only_while_masquerading: false,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_duration_seconds(mut self, seconds: i64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_username_attribute(mut self, attribute: String) -> Self {
        self.username_attribute = attribute;
        self
    }

    #[must_use]
    pub fn with_prompt_only_while_masquerading(mut self, enabled: bool) -> Self {
        self.prompt_only_while_masquerading = enabled;
        self
    }

    #[must_use]
    pub fn with_trust_proxy_headers(mut self, enabled: bool) -> Self {
        self.trust_proxy_headers = enabled;
        self
    }

    /// # Errors
    /// Returns `ConfigError` for a non-positive duration or a username attribute
    /// that is not a plain identifier.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.duration_seconds <= 0 {
            return Err(ConfigError::InvalidDuration(self.duration_seconds));
        }
        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .is_ok_and(|regex| regex.is_match(&self.username_attribute));
        if !identifier {
            return Err(ConfigError::InvalidUsernameAttribute(
                self.username_attribute,
            ));
        }
        Ok(self)
    }

    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    #[must_use]
    pub fn username_attribute(&self) -> &str {
        &self.username_attribute
    }

    #[must_use]
    pub fn prompt_only_while_masquerading(&self) -> bool {
        self.prompt_only_while_masquerading
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}
