//! Shared configuration for emslink tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `emslink_core::SessionConfig`. The CLI layers its flag
//! overrides on top of what this crate produces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use emslink_core::{Credentials, ReconnectConfig, SessionConfig};

const KEYRING_SERVICE: &str = "emslink";
const PASSWORD_ENV: &str = "EMSLINK_PASSWORD";
const USERNAME_ENV: &str = "EMSLINK_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile` when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Subscription debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Requests held while offline.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_debounce_ms() -> u64 {
    100
}
fn default_queue_capacity() -> usize {
    SessionConfig::DEFAULT_QUEUE_CAPACITY
}

/// A named backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Backend WebSocket URL (e.g., "wss://portal.example.com/openems-backend-ui2").
    pub endpoint: String,

    /// Login name. Direct edge connections accept a password alone.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Edge to select after login.
    pub edge: Option<String>,

    /// Override request timeout (seconds).
    pub timeout: Option<u64>,

    /// Give up after this many failed reconnects. Unset retries forever.
    pub max_retries: Option<u32>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "emslink", "emslink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("emslink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` (missing files are fine) + `EMSLINK_` env vars.
///
/// Nested keys use a double underscore: `EMSLINK_DEFAULTS__TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("EMSLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve the login password from the credential chain.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve login credentials for a profile.
pub fn resolve_credentials(profile: &Profile, profile_name: &str) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok());
    let password = resolve_password(profile, profile_name)?;
    Ok(Credentials::Password { username, password })
}

/// Store a password in the system keyring for `profile_name`.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

/// Parse and check a backend endpoint.
pub fn parse_endpoint(raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "endpoint".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("expected a ws:// or wss:// URL, got '{other}://'"),
        }),
    }
}

/// Build a `SessionConfig` from a profile without CLI flag overrides.
///
/// A profile without any resolvable password still yields a config; its
/// `credentials` are `None` and the caller decides whether to prompt.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let endpoint = parse_endpoint(&profile.endpoint)?;

    let mut config = SessionConfig::new(endpoint);
    config.default_edge.clone_from(&profile.edge);
    config.request_timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.debounce_window = Duration::from_millis(defaults.debounce_ms);
    config.queue_capacity = defaults.queue_capacity;
    config.reconnect = ReconnectConfig {
        max_retries: profile.max_retries,
        ..ReconnectConfig::default()
    };
    config.validate().map_err(|e| ConfigError::Validation {
        field: "timeout".into(),
        reason: e.to_string(),
    })?;

    config.credentials = match resolve_credentials(profile, profile_name) {
        Ok(credentials) => Some(credentials),
        Err(ConfigError::NoCredentials { .. }) => None,
        Err(e) => return Err(e),
    };
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
timeout = 10
debounce_ms = 250

[profiles.home]
endpoint = "ws://192.168.1.50:8085/websocket"
password = "user"
edge = "edge0"

[profiles.portal]
endpoint = "wss://portal.example.com/openems-backend-ui2"
username = "installer@example.com"
timeout = 60
max_retries = 5
"#;

    fn write_sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_profiles_and_defaults() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("home"));
        assert_eq!(config.defaults.timeout, 10);
        assert_eq!(config.defaults.debounce_ms, 250);
        assert_eq!(config.defaults.queue_capacity, 64);
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles["portal"].max_retries, Some(5));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
        assert_eq!(config.defaults.timeout, 30);
    }

    #[test]
    fn profile_lookup_uses_default_profile() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(profile.edge.as_deref(), Some("edge0"));

        let (name, _) = config.profile(Some("portal")).unwrap();
        assert_eq!(name, "portal");

        assert!(matches!(
            config.profile(Some("nope")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn profile_translates_to_session_config() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();
        let (name, profile) = config.profile(Some("portal")).unwrap();

        let session = profile_to_session_config(profile, name, &config.defaults).unwrap();
        assert_eq!(session.endpoint.as_str(), "wss://portal.example.com/openems-backend-ui2");
        assert_eq!(session.request_timeout, Duration::from_secs(60));
        assert_eq!(session.debounce_window, Duration::from_millis(250));
        assert_eq!(session.reconnect.max_retries, Some(5));
        assert_eq!(session.default_edge, None);
    }

    #[test]
    fn http_endpoints_are_rejected() {
        let profile = Profile {
            endpoint: "https://portal.example.com".into(),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, "p", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "endpoint"));
        assert!(parse_endpoint("not a url").is_err());
    }

    #[test]
    fn out_of_range_timeouts_are_rejected() {
        let profile = Profile {
            endpoint: "ws://localhost:8082".into(),
            timeout: Some(100_000_000),
            ..Profile::default()
        };
        let err = profile_to_session_config(&profile, "p", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "timeout"));

        let profile = Profile {
            timeout: Some(0),
            ..profile
        };
        assert!(profile_to_session_config(&profile, "p", &Defaults::default()).is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                endpoint: "ws://localhost:8082".into(),
                edge: Some("edge3".into()),
                ..Profile::default()
            },
        );
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (_, profile) = loaded.profile(None).unwrap();
        assert_eq!(profile.endpoint, "ws://localhost:8082");
        assert_eq!(profile.edge.as_deref(), Some("edge3"));
    }
}
