// ── Runtime session configuration ──
//
// These types describe *how* to reach a backend and authenticate.
// They carry credential data and tuning knobs, but never touch disk.
// The CLI (or any embedder) constructs a `SessionConfig` and hands it in.

use std::time::Duration;

use emslink_api::ReconnectConfig;
use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// How to authenticate with the backend.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Username/password login. Direct edge connections accept a bare
    /// password, so the username is optional.
    Password {
        username: Option<String>,
        password: SecretString,
    },
    /// A session token issued by an earlier login.
    Token(SecretString),
}

/// Configuration for one session against one backend.
///
/// Built by the caller and passed to `Session`; core never reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Backend WebSocket endpoint (`ws://` or `wss://`).
    pub endpoint: Url,
    /// Credentials used by `connect()`. `login()` can supply them later.
    pub credentials: Option<Credentials>,
    /// Edge to select once edge metadata is known.
    pub default_edge: Option<String>,
    /// Per-request deadline, measured from when the request is issued.
    pub request_timeout: Duration,
    /// Requests held while not authenticated. 0 disables queueing.
    pub queue_capacity: usize,
    /// Debounce window for channel subscription batches.
    pub debounce_window: Duration,
    /// Page size for `getEdges`.
    pub edge_page_size: u32,
    /// Reconnect backoff for the underlying connection.
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
    pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);
    pub const DEFAULT_EDGE_PAGE_SIZE: u32 = 100;
    /// Longest accepted request deadline or debounce window.
    pub const MAX_TIMER: Duration = Duration::from_secs(24 * 60 * 60);

    /// Defaults for everything except the endpoint.
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            credentials: None,
            default_edge: None,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            debounce_window: Self::DEFAULT_DEBOUNCE_WINDOW,
            edge_page_size: Self::DEFAULT_EDGE_PAGE_SIZE,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Reject timer settings the session cannot arm.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_timer("request timeout", self.request_timeout, Duration::from_millis(1))?;
        check_timer("debounce window", self.debounce_window, Duration::ZERO)
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_default_edge(mut self, edge_id: impl Into<String>) -> Self {
        self.default_edge = Some(edge_id.into());
        self
    }
}

fn check_timer(name: &str, value: Duration, min: Duration) -> Result<(), CoreError> {
    if value < min || value > SessionConfig::MAX_TIMER {
        return Err(CoreError::Config {
            message: format!(
                "{name} must be between {}ms and {}s, got {}ms",
                min.as_millis(),
                SessionConfig::MAX_TIMER.as_secs(),
                value.as_millis()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::new(Url::parse("ws://localhost:8082").unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.debounce_window, Duration::from_millis(100));
        assert_eq!(config.edge_page_size, 100);
        assert!(config.credentials.is_none());
        assert!(config.default_edge.is_none());
    }

    #[test]
    fn validate_bounds_timers() {
        let mut config = SessionConfig::new(Url::parse("ws://localhost:8082").unwrap());
        assert!(config.validate().is_ok());

        config.request_timeout = Duration::from_secs(100_000_000);
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));

        config.request_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));

        config.request_timeout = SessionConfig::MAX_TIMER;
        config.debounce_window = Duration::from_secs(90_000);
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));
    }
}
