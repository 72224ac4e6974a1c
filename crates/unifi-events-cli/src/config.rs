//! CLI-owned configuration: TOML profiles and translation to
//! `unifi_events::ControllerConfig`.
//!
//! The library never sees these types -- it receives a pre-built
//! `ControllerConfig`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use unifi_events::{ControllerConfig, Generation, ReconnectConfig, Scheme};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── TOML config structs ──────────────────────────────────────────────

/// Config file layout.
///
/// ```toml
/// default_profile = "home"
///
/// [defaults]
/// timeout = 30
///
/// [profiles.home]
/// host = "192.168.1.1"
/// generation = "unifi-os"
/// username = "admin"
/// insecure = true
/// ```
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when --profile is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    /// REST timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds between a stream failure and the reconnect attempt.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,

    /// Seconds between heartbeat pings.
    #[serde(default = "default_heartbeat")]
    pub heartbeat: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            reconnect_delay: default_reconnect_delay(),
            heartbeat: default_heartbeat(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_reconnect_delay() -> u64 {
    5
}
fn default_heartbeat() -> u64 {
    15
}

/// One controller.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    pub host: String,
    pub port: Option<u16>,
    pub site: Option<String>,
    #[serde(default)]
    pub generation: Generation,
    /// `http` for controllers behind a TLS-terminating proxy.
    #[serde(default)]
    pub scheme: Scheme,
    pub username: Option<String>,
    /// Plaintext password -- prefer UNIFI_EVENTS_PASSWORD.
    pub password: Option<String>,
    pub insecure: Option<bool>,
    pub timeout: Option<u64>,
}

// ── Config file path ─────────────────────────────────────────────────

/// `--config` if given, otherwise the platform config dir.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    if let Some(ref path) = global.config {
        return path.clone();
    }
    ProjectDirs::from("", "", "unifi-events").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("unifi-events");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ───────────────────────────────────────────────────

/// Load defaults, then the TOML file, then `UNIFI_EVENTS_*` overrides
/// (`UNIFI_EVENTS_DEFAULTS__TIMEOUT=10`).
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_path(global);
    tracing::debug!(path = %path.display(), "loading config");

    let config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("UNIFI_EVENTS_").split("__"))
        .extract()?;
    Ok(config)
}

// ── Profile resolution ───────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Combine flags, profile and defaults into a `ControllerConfig`.
///
/// Flags win over the profile, the profile over `[defaults]`. An explicitly
/// requested profile must exist; the implicit default may be absent as
/// long as --host is given.
pub fn resolve(global: &GlobalOpts, config: &Config) -> Result<ControllerConfig, CliError> {
    let name = active_profile_name(global, config);
    let fallback = Profile::default();
    let profile = match config.profiles.get(&name) {
        Some(profile) => profile,
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name,
                available: available_profiles(config),
            });
        }
        None => &fallback,
    };

    let host = global
        .host
        .clone()
        .or_else(|| (!profile.host.is_empty()).then(|| profile.host.clone()))
        .ok_or_else(|| CliError::NoConfig {
            path: config_path(global).display().to_string(),
        })?;

    let generation = if global.unifi_os {
        Generation::UnifiOs
    } else {
        profile.generation
    };
    let port = global
        .port
        .or(profile.port)
        .unwrap_or(match generation {
            Generation::UnifiOs => 443,
            Generation::Classic => 8443,
        });

    let password = global
        .password
        .clone()
        .or_else(|| profile.password.clone())
        .ok_or_else(|| CliError::NoCredentials {
            profile: name.clone(),
        })?;
    let username = global
        .username
        .clone()
        .or_else(|| profile.username.clone())
        .unwrap_or_else(|| "admin".into());

    let site = global
        .site
        .clone()
        .or_else(|| profile.site.clone())
        .unwrap_or_else(|| "default".into());

    let insecure = global.insecure || profile.insecure.unwrap_or(config.defaults.insecure);
    let timeout = global
        .timeout
        .or(profile.timeout)
        .unwrap_or(config.defaults.timeout);

    Ok(ControllerConfig::new(host, port)
        .with_credentials(username, SecretString::from(password))
        .with_site(site)
        .with_generation(generation)
        .with_scheme(profile.scheme)
        .with_verify_tls(!insecure)
        .with_timeout(Duration::from_secs(timeout))
        .with_reconnect(ReconnectConfig {
            delay: Duration::from_secs(config.defaults.reconnect_delay),
            heartbeat_interval: Duration::from_secs(config.defaults.heartbeat),
        }))
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        return "(none)".into();
    }
    config
        .profiles
        .keys()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use clap::Parser;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["unifi-events"];
        argv.extend_from_slice(args);
        argv.push("listen");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn config_with(name: &str, profile: Profile) -> Config {
        let mut config = Config::default();
        config.profiles.insert(name.into(), profile);
        config
    }

    #[test]
    fn flags_alone_are_enough() {
        let resolved = resolve(
            &global(&["--host", "10.0.0.1", "--password", "pw"]),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(resolved.host, "10.0.0.1");
        assert_eq!(resolved.port, 8443);
        assert_eq!(resolved.username, "admin");
        assert_eq!(resolved.password.expose_secret(), "pw");
        assert_eq!(resolved.generation, Generation::Classic);
        assert!(resolved.verify_tls);
    }

    #[test]
    fn unifi_os_flag_changes_default_port() {
        let resolved = resolve(
            &global(&["--host", "udm", "--password", "pw", "--unifi-os"]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(resolved.generation, Generation::UnifiOs);
        assert_eq!(resolved.port, 443);
    }

    #[test]
    fn flags_override_profile() {
        let config = config_with(
            "default",
            Profile {
                host: "192.168.1.1".into(),
                site: Some("home".into()),
                generation: Generation::UnifiOs,
                password: Some("from-file".into()),
                insecure: Some(true),
                ..Profile::default()
            },
        );

        let resolved = resolve(&global(&["--site", "lab"]), &config).unwrap();
        assert_eq!(resolved.host, "192.168.1.1");
        assert_eq!(resolved.site, "lab");
        assert_eq!(resolved.generation, Generation::UnifiOs);
        assert_eq!(resolved.password.expose_secret(), "from-file");
        assert!(!resolved.verify_tls);
    }

    #[test]
    fn missing_host_is_no_config() {
        let err = resolve(&global(&["--password", "pw"]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }), "got {err:?}");
    }

    #[test]
    fn missing_password_is_no_credentials() {
        let err = resolve(&global(&["--host", "unifi"]), &Config::default()).unwrap_err();
        assert!(
            matches!(err, CliError::NoCredentials { ref profile } if profile == "default"),
            "got {err:?}"
        );
    }

    #[test]
    fn explicit_unknown_profile_lists_alternatives() {
        let config = config_with("home", Profile::default());
        let err = resolve(&global(&["--profile", "office"]), &config).unwrap_err();
        match err {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "office");
                assert_eq!(available, "home");
            }
            other => panic!("expected ProfileNotFound, got {other:?}"),
        }
    }
}
