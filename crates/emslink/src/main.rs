mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use emslink_config::{self as config, ConfigError, Profile};
use emslink_core::SessionConfig;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a backend connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        // All other commands require a session
        cmd => {
            let (session_config, username) = build_session_config(&cli.global)?;
            tracing::debug!(command = ?cmd, endpoint = %session_config.endpoint, "dispatching command");
            commands::dispatch(cmd, session_config, username, &cli.global).await
        }
    }
}

/// Build a `SessionConfig` from the config file, profile, and CLI overrides.
///
/// Also returns the login name, for prompting when no password is stored.
fn build_session_config(global: &GlobalOpts) -> Result<(SessionConfig, Option<String>), CliError> {
    let cfg = config::load_config_or_default();

    let (profile_name, profile) = match cfg.profile(global.profile.as_deref()) {
        Ok((name, profile)) => (name.to_owned(), profile.clone()),
        Err(ConfigError::UnknownProfile { name }) => match (&global.profile, &global.endpoint) {
            // Flags / env alone are enough when no profile was asked for.
            (None, Some(_)) => (name, Profile::default()),
            (Some(_), _) => return Err(profile_error(&cfg, name, true)),
            (None, None) => return Err(profile_error(&cfg, name, false)),
        },
        Err(e) => return Err(e.into()),
    };

    let profile = apply_overrides(profile, global);
    let mut session = config::profile_to_session_config(&profile, &profile_name, &cfg.defaults)?;

    if let Some(secs) = global.timeout {
        session.request_timeout = Duration::from_secs(secs);
    }
    session.validate()?;
    Ok((session, profile.username))
}

fn apply_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(endpoint) = &global.endpoint {
        profile.endpoint.clone_from(endpoint);
    }
    if global.username.is_some() {
        profile.username.clone_from(&global.username);
    }
    if global.edge.is_some() {
        profile.edge.clone_from(&global.edge);
    }
    profile
}

fn profile_error(cfg: &config::Config, name: String, explicit: bool) -> CliError {
    if !explicit {
        return CliError::NoConfig {
            path: config::config_path().display().to_string(),
        };
    }
    let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    available.sort_unstable();
    CliError::ProfileNotFound {
        name,
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
    }
}
