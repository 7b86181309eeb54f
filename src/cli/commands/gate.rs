//! Step-up gate flags.

use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};

use crate::gate::{config::DEFAULT_USERNAME_ATTRIBUTE, GateConfig};

pub const ARG_SUDO_DURATION: &str = "sudo-duration";
pub const ARG_SUDO_USERNAME: &str = "sudo-username";
pub const ARG_SUDO_MASQUERADE_ONLY: &str = "sudo-masquerade-only";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

#[derive(Debug, Clone)]
pub struct Options {
    pub duration_seconds: i64,
    pub username_attribute: String,
    pub masquerade_only: bool,
    pub trust_proxy_headers: bool,
}

impl Options {
    /// Parse gate arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let duration_seconds = matches
            .get_one::<i64>(ARG_SUDO_DURATION)
            .copied()
            .context(format!("missing required argument: --{ARG_SUDO_DURATION}"))?;

        // An empty SUDO_USERNAME falls back to the default attribute.
        let username_attribute = matches
            .get_one::<String>(ARG_SUDO_USERNAME)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME_ATTRIBUTE.to_string());

        Ok(Self {
            duration_seconds,
            username_attribute,
            masquerade_only: matches.get_flag(ARG_SUDO_MASQUERADE_ONLY),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        })
    }

    /// Build and validate the gate configuration.
    ///
    /// # Errors
    /// Returns an error if the duration or username attribute is invalid.
    pub fn config(&self) -> Result<GateConfig> {
        GateConfig::new()
            .with_duration_seconds(self.duration_seconds)
            .with_username_attribute(self.username_attribute.clone())
            .with_prompt_only_while_masquerading(self.masquerade_only)
            .with_trust_proxy_headers(self.trust_proxy_headers)
            .validate()
            .context("invalid step-up gate configuration")
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SUDO_DURATION)
                .long(ARG_SUDO_DURATION)
                .help("Seconds a password confirmation stays valid")
                .env("SUDO_DURATION")
                .default_value("7200")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SUDO_USERNAME)
                .long(ARG_SUDO_USERNAME)
                .help("User attribute matched against the login username")
                .env("SUDO_USERNAME")
                .default_value(DEFAULT_USERNAME_ATTRIBUTE),
        )
        .arg(
            Arg::new(ARG_SUDO_MASQUERADE_ONLY)
                .long(ARG_SUDO_MASQUERADE_ONLY)
                .help("Only ask for a password while masquerading as another user")
                .env("SUDO_MASQUERADE_PROMPT")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Honor X-Forwarded-Proto/Host/Prefix when rebuilding request URLs")
                .env("SUDO_GATE_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("sudo-gate"))
    }

    fn cleared<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("SUDO_DURATION", None::<&str>),
                ("SUDO_USERNAME", None::<&str>),
                ("SUDO_MASQUERADE_PROMPT", None::<&str>),
                ("SUDO_GATE_TRUST_PROXY_HEADERS", None::<&str>),
            ],
            f,
        );
    }

    #[test]
    fn defaults() {
        cleared(|| {
            let matches = command().get_matches_from(vec!["sudo-gate"]);
            let options = Options::parse(&matches);
            assert!(options.is_ok());
            if let Ok(options) = options {
                assert_eq!(options.duration_seconds, 7200);
                assert_eq!(options.username_attribute, "email");
                assert!(!options.masquerade_only);
                assert!(!options.trust_proxy_headers);
                assert!(options.config().is_ok());
            }
        });
    }

    #[test]
    fn env_values() {
        temp_env::with_vars(
            [
                ("SUDO_DURATION", Some("600")),
                ("SUDO_USERNAME", Some("username")),
                ("SUDO_MASQUERADE_PROMPT", Some("1")),
                ("SUDO_GATE_TRUST_PROXY_HEADERS", Some("true")),
            ],
            || {
                let matches = command().get_matches_from(vec!["sudo-gate"]);
                let config = Options::parse(&matches).and_then(|options| options.config());
                assert!(config.is_ok());
                if let Ok(config) = config {
                    assert_eq!(config.duration_seconds(), 600);
                    assert_eq!(config.username_attribute(), "username");
                    assert!(config.prompt_only_while_masquerading());
                    assert!(config.trust_proxy_headers());
                }
            },
        );
    }

    #[test]
    fn empty_username_falls_back_to_email() {
        temp_env::with_vars([("SUDO_USERNAME", Some(""))], || {
            let matches = command().get_matches_from(vec!["sudo-gate"]);
            let options = Options::parse(&matches);
            assert_eq!(
                options.map(|options| options.username_attribute).ok(),
                Some("email".to_string())
            );
        });
    }

    #[test]
    fn invalid_values_are_rejected_by_config() {
        cleared(|| {
            let matches =
                command().get_matches_from(vec!["sudo-gate", "--sudo-duration", "-5"]);
            let config = Options::parse(&matches).and_then(|options| options.config());
            assert!(config.is_err());

            let matches =
                command().get_matches_from(vec!["sudo-gate", "--sudo-username", "e-mail"]);
            let config = Options::parse(&matches).and_then(|options| options.config());
            assert!(config.is_err());
        });
    }
}
