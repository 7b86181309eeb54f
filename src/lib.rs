//! # sudo-gate
//!
//! Step-up re-authentication ("sudo mode") for sessions that are already
//! signed in. Sensitive routes sit behind a gate that asks for the password
//! again once the last verification is older than the configured duration.
//!
//! - [`gate`]: the decision procedure. Pure and synchronous; it talks to the
//!   outside world only through the `SessionStore` and `IdentityProvider`
//!   traits.
//! - [`api`]: an axum service wiring the gate in front of sample sensitive
//!   endpoints, with cookie sessions, a JSON users file and masquerading.
//! - [`cli`]: command line, configuration and telemetry bootstrap.

pub mod api;
pub mod cli;
pub mod gate;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Not built from a git checkout
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
