//! Command dispatch: bridges CLI args -> session calls -> output formatting.

pub mod config_cmd;
pub mod edges;
pub mod history;
pub mod request;
pub mod util;
pub mod watch;

use emslink_core::{CoreError, Credentials, Session, SessionConfig};
use secrecy::SecretString;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Log in, run a session-bound command, then log out.
pub async fn dispatch(
    cmd: Command,
    config: SessionConfig,
    username: Option<String>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = connect(config, username).await?;

    let result = match cmd {
        Command::Edges => edges::handle(&session, global),
        Command::Watch(args) => watch::handle(&session, args, global).await,
        Command::History(args) => history::handle(&session, args, global).await,
        Command::Request(args) => request::handle(&session, args, global).await,
        // Config is handled before dispatch
        Command::Config(_) => Ok(()),
    };

    if let Err(e) = session.logout().await {
        tracing::debug!(error = %e, "logout failed");
    }
    result
}

/// Open a session and authenticate, prompting for a password if none is
/// configured. Selects the configured edge, if any.
async fn connect(mut config: SessionConfig, username: Option<String>) -> Result<Session, CliError> {
    let credentials = match config.credentials.take() {
        Some(credentials) => credentials,
        None => prompt_credentials(username)?,
    };
    let wanted_edge = config.default_edge.clone();
    let url = config.endpoint.to_string();
    let timeout = config.request_timeout;

    let session = Session::new(config);
    let info = session.login(credentials).await.map_err(|e| match e {
        // The backend never answered, usually because the socket never opened.
        CoreError::Timeout { .. } => CliError::ConnectionFailed {
            url,
            reason: format!("no login response within {}s", timeout.as_secs()),
        },
        other => other.into(),
    })?;
    tracing::info!(user = %info.user.name, edges = info.edges.len(), "logged in");

    if let Some(edge_id) = wanted_edge {
        session.select_edge(&edge_id).await?;
    }
    Ok(session)
}

fn prompt_credentials(username: Option<String>) -> Result<Credentials, CliError> {
    let password = rpassword::prompt_password("Password: ").map_err(|e| CliError::Validation {
        field: "password".into(),
        reason: format!("prompt failed: {e}"),
    })?;
    if password.is_empty() {
        return Err(CliError::AuthFailed {
            message: "no password given".into(),
        });
    }
    Ok(Credentials::Password {
        username,
        password: SecretString::from(password),
    })
}
