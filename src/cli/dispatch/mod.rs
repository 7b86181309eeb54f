//! Map validated CLI arguments to an action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{gate, session, ARG_PORT, ARG_USERS_FILE, CMD_HASH_PASSWORD};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if matches.subcommand_name() == Some(CMD_HASH_PASSWORD) {
        return Ok(Action::HashPassword);
    }

    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let users_file = matches
        .get_one::<String>(ARG_USERS_FILE)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .context(format!("missing required argument: --{ARG_USERS_FILE}"))?;

    let gate = gate::Options::parse(matches)?.config()?;
    let session = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        users_file,
        gate,
        cookie: session.cookie(),
    }))
}
