use crate::{
    api::{self, session::CookieConfig, users::UserDirectory, AppState},
    cli::telemetry,
    gate::{Gate, GateConfig},
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub users_file: PathBuf,
    pub gate: GateConfig,
    pub cookie: CookieConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the users file cannot be loaded or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let directory = UserDirectory::load_json(&args.users_file).with_context(|| {
        format!(
            "Could not load users from {}",
            args.users_file.display()
        )
    })?;
    if directory.is_empty() {
        warn!("User directory is empty; nobody can sign in");
    } else {
        info!("Loaded {} users", directory.len());
    }

    let state = AppState::new(Gate::new(args.gate), directory, args.cookie);
    let result = api::new(args.port, Arc::new(state)).await;

    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("users_file", args.users_file.display().to_string()),
        ("sudo_duration", format!("{}s", args.gate.duration_seconds())),
        ("sudo_username", args.gate.username_attribute().to_string()),
        (
            "sudo_masquerade_only",
            args.gate.prompt_only_while_masquerading().to_string(),
        ),
        (
            "trust_proxy_headers",
            args.gate.trust_proxy_headers().to_string(),
        ),
        ("session_ttl", format!("{}s", args.cookie.ttl_seconds())),
        ("cookie_secure", args.cookie.secure().to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.chars().take(7).collect()
}
