//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use emslink_config::ConfigError;
use emslink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to backend at {url}: {reason}")]
    #[diagnostic(
        code(emslink::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             URL: {url}\n\
             Endpoints are WebSocket URLs (ws:// or wss://)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection lost: {reason}")]
    #[diagnostic(code(emslink::disconnected))]
    Disconnected { reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(emslink::auth_failed),
        help(
            "Verify your username and password.\n\
             Run: emslink config set-password --profile <name>"
        )
    )]
    AuthFailed { message: String },

    // ── Edges ────────────────────────────────────────────────────────

    #[error("Edge '{edge_id}' not found")]
    #[diagnostic(
        code(emslink::unknown_edge),
        help("Run: emslink edges to see the edges this account can access")
    )]
    UnknownEdge { edge_id: String },

    #[error("No edge selected")]
    #[diagnostic(
        code(emslink::no_edge),
        help(
            "This account has access to several edges.\n\
             Pick one with --edge <id> or set `edge` in your profile."
        )
    )]
    NoEdgeSelected,

    // ── Backend ──────────────────────────────────────────────────────

    #[error("Backend error ({code}): {message}")]
    #[diagnostic(code(emslink::backend_error))]
    Backend { code: i64, message: String },

    #[error("Request failed: {message}")]
    #[diagnostic(code(emslink::request_failed))]
    Request { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(emslink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(emslink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: emslink config set <name> --endpoint <url>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(emslink::no_config),
        help(
            "Pass --endpoint or create a profile with: emslink config set\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(emslink::config))]
    Config(#[from] ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(emslink::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { millis: u64 },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(emslink::json), help("Params must be a JSON object, e.g. '{{\"page\": 0}}'."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::UnknownEdge { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::Json(_) => exit_code::USAGE,
            Self::Config(ConfigError::NoCredentials { .. }) => exit_code::AUTH,
            Self::Config(ConfigError::Validation { .. }) => exit_code::USAGE,
            Self::Config(ConfigError::UnknownProfile { .. }) => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::TransportClosed | CoreError::NotConnected | CoreError::SessionEnded => {
                CliError::Disconnected {
                    reason: err.to_string(),
                }
            }

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout { timeout_ms, .. } => CliError::Timeout { millis: timeout_ms },

            CoreError::UnknownEdge { edge_id } => CliError::UnknownEdge { edge_id },

            CoreError::NoEdgeSelected => CliError::NoEdgeSelected,

            CoreError::Protocol { code, message } => CliError::Backend { code, message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Backpressure { .. }
            | CoreError::InvalidResponse { .. }
            | CoreError::Internal(_) => CliError::Request {
                message: err.to_string(),
            },
        }
    }
}
