//! Config subcommand handlers.

use emslink_config::{self as config, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, ConfigSetArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.password.is_some() {
                    profile.password = Some(REDACTED.into());
                }
            }
            let rendered = toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
                field: "config".into(),
                reason: format!("failed to serialize config: {e}"),
            })?;
            output::print_output(&rendered);
            Ok(())
        }

        ConfigCommand::Set(set) => {
            let mut cfg = config::load_config_or_default();
            let name = set.name.clone();
            upsert_profile(&mut cfg, set, global)?;
            config::save_config(&cfg)?;
            eprintln!("Profile '{name}' saved to {}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = config::load_config_or_default();
            let name = global
                .profile
                .clone()
                .or(cfg.default_profile)
                .unwrap_or_else(|| "default".into());

            let password = rpassword::prompt_password(format!("Password for '{name}': "))
                .map_err(|e| CliError::Validation {
                    field: "password".into(),
                    reason: format!("prompt failed: {e}"),
                })?;
            config::store_password(&name, &password)?;
            eprintln!("Password for '{name}' stored in the system keyring");
            Ok(())
        }
    }
}

fn upsert_profile(cfg: &mut Config, set: ConfigSetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let previous = cfg.profiles.get(&set.name).cloned().unwrap_or_default();
    let endpoint = global.endpoint.clone().unwrap_or_else(|| previous.endpoint.clone());
    if endpoint.is_empty() {
        return Err(CliError::Validation {
            field: "endpoint".into(),
            reason: "a new profile needs --endpoint <ws://...>".into(),
        });
    }
    config::parse_endpoint(&endpoint)?;

    let profile = Profile {
        endpoint,
        username: global.username.clone().or_else(|| previous.username.clone()),
        edge: global.edge.clone().or_else(|| previous.edge.clone()),
        ..previous
    };
    if set.default || cfg.profiles.is_empty() {
        cfg.default_profile = Some(set.name.clone());
    }
    cfg.profiles.insert(set.name, profile);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn set(name: &str) -> ConfigSetArgs {
        ConfigSetArgs {
            name: name.into(),
            default: false,
        }
    }

    fn global(endpoint: Option<&str>, edge: Option<&str>) -> GlobalOpts {
        GlobalOpts {
            profile: None,
            endpoint: endpoint.map(Into::into),
            username: None,
            edge: edge.map(Into::into),
            output: crate::cli::OutputFormat::Table,
            verbose: 0,
            timeout: None,
        }
    }

    #[test]
    fn first_profile_becomes_default() {
        let mut cfg = Config {
            default_profile: None,
            ..Config::default()
        };
        upsert_profile(&mut cfg, set("home"), &global(Some("ws://10.0.0.5:8085"), None)).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("home"));
    }

    #[test]
    fn updating_keeps_unset_fields() {
        let mut cfg = Config::default();
        upsert_profile(&mut cfg, set("home"), &global(Some("ws://10.0.0.5:8085"), Some("edge0")))
            .unwrap();

        upsert_profile(&mut cfg, set("home"), &global(Some("ws://10.0.0.6:8085"), None)).unwrap();
        let profile = &cfg.profiles["home"];
        assert_eq!(profile.endpoint, "ws://10.0.0.6:8085");
        assert_eq!(profile.edge.as_deref(), Some("edge0"));
    }

    #[test]
    fn non_websocket_endpoint_is_rejected() {
        let mut cfg = Config::default();
        assert!(upsert_profile(&mut cfg, set("x"), &global(Some("http://10.0.0.5"), None)).is_err());
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn new_profile_needs_an_endpoint() {
        let mut cfg = Config::default();
        let err = upsert_profile(&mut cfg, set("x"), &global(None, Some("edge0"))).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn existing_profile_can_change_edge_only() {
        let mut cfg = Config::default();
        upsert_profile(&mut cfg, set("home"), &global(Some("ws://10.0.0.5:8085"), None)).unwrap();
        upsert_profile(&mut cfg, set("home"), &global(None, Some("edge3"))).unwrap();
        let profile = &cfg.profiles["home"];
        assert_eq!(profile.endpoint, "ws://10.0.0.5:8085");
        assert_eq!(profile.edge.as_deref(), Some("edge3"));
    }
}
