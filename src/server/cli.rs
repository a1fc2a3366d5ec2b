//! Command-line interface and layered configuration for the hosting server.
//!
//! Values are resolved from, lowest precedence first: built-in defaults, the
//! TOML configuration file, `PUBSUB_MQTT_*` environment variables, and
//! command-line flags.

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::MAX_REMAINING_LENGTH;

/// Configuration file read from the working directory unless overridden.
pub const DEFAULT_CONFIG_FILE: &str = "pubsub-mqtt.toml";

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "PUBSUB_MQTT_";

/// Default listening address.
pub const DEFAULT_BIND: &str = "0.0.0.0:1883";

/// Default packet body limit in bytes.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Smallest useful body limit; a PUBACK body is two bytes.
const MIN_PACKET_SIZE: usize = 2;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `bind` does not parse as a socket address.
    #[error("bind address {0} is invalid")]
    InvalidBind(String),
    /// `max_packet_size` is below two bytes or above the remaining-length
    /// maximum.
    #[error("max packet size {0} is outside 2..=268435455")]
    InvalidMaxPacketSize(usize),
    /// A password was configured without the username it belongs to.
    #[error("password is set without a username")]
    PasswordWithoutUsername,
    /// A configuration layer failed to parse or extract.
    #[error("failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Largest accepted packet body in bytes, fixed header excluded.
    pub max_packet_size: usize,
    /// Username clients must present; `None` accepts any.
    pub username: Option<String>,
    /// Password clients must present alongside `username`.
    pub password: Option<String>,
    /// Accept clients that send no username.
    pub allow_anonymous: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_owned(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            username: None,
            password: None,
            allow_anonymous: true,
        }
    }
}

impl AppConfig {
    /// Parse the bind address.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidBind`] when `bind` is not a socket
    /// address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.bind.clone()))
    }

    /// Check every field for a usable value.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if !(MIN_PACKET_SIZE..=MAX_REMAINING_LENGTH).contains(&self.max_packet_size) {
            return Err(ConfigError::InvalidMaxPacketSize(self.max_packet_size));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::PasswordWithoutUsername);
        }
        Ok(())
    }
}

/// Command-line flags for `pubsub-mqtt-server`.
///
/// Unset flags leave lower layers untouched.
#[derive(Parser, Serialize, Default, Debug, Clone)]
#[command(name = "pubsub-mqtt-server", version, about = "MQTT pub/sub relay server")]
pub struct Cli {
    /// Configuration file path.
    #[arg(long, short = 'c')]
    #[serde(skip)]
    pub config: Option<PathBuf>,
    /// Socket address to listen on.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Largest accepted packet body in bytes.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_packet_size: Option<usize>,
    /// Username clients must present.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password clients must present.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Accept clients that send no username.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_anonymous: Option<bool>,
}

/// Resolve and validate the configuration for `cli`.
///
/// # Errors
/// Returns [`ConfigError`] when a layer cannot be parsed or the merged values
/// are invalid.
pub fn load_config(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let file = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(cli))
        .extract()
        .map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use rstest::rstest;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pubsub-mqtt-server").chain(args.iter().copied()))
            .expect("parse")
    }

    #[rstest]
    fn defaults_apply_without_layers() {
        Jail::expect_with(|_j| {
            let cfg = load_config(&Cli::default()).expect("load");
            assert_eq!(cfg, AppConfig::default());
            assert_eq!(cfg.bind, "0.0.0.0:1883");
            assert!(cfg.allow_anonymous);
            Ok(())
        });
    }

    #[rstest]
    fn env_config_loading() {
        Jail::expect_with(|j| {
            j.set_env("PUBSUB_MQTT_BIND", "127.0.0.1:8000");
            j.set_env("PUBSUB_MQTT_MAX_PACKET_SIZE", "4096");
            j.set_env("PUBSUB_MQTT_ALLOW_ANONYMOUS", "false");
            let cfg = load_config(&Cli::default()).expect("load");
            assert_eq!(cfg.bind, "127.0.0.1:8000");
            assert_eq!(cfg.max_packet_size, 4096);
            assert!(!cfg.allow_anonymous);
            Ok(())
        });
    }

    #[rstest]
    fn env_overrides_file() {
        Jail::expect_with(|j| {
            j.create_file(
                DEFAULT_CONFIG_FILE,
                "bind = \"1.2.3.4:1111\"\nusername = \"file-user\"",
            )?;
            j.set_env("PUBSUB_MQTT_BIND", "127.0.0.1:2222");
            let cfg = load_config(&Cli::default()).expect("load");
            assert_eq!(cfg.bind, "127.0.0.1:2222");
            assert_eq!(cfg.username.as_deref(), Some("file-user"));
            Ok(())
        });
    }

    #[rstest]
    fn cli_overrides_env() {
        Jail::expect_with(|j| {
            j.set_env("PUBSUB_MQTT_BIND", "127.0.0.1:8000");
            let cli = parse(&["--bind", "0.0.0.0:9000", "--allow-anonymous", "false"]);
            let cfg = load_config(&cli).expect("load");
            assert_eq!(cfg.bind, "0.0.0.0:9000");
            assert!(!cfg.allow_anonymous);
            Ok(())
        });
    }

    #[rstest]
    fn loads_explicit_config_file() {
        Jail::expect_with(|j| {
            j.create_file("custom.toml", "username = \"admin\"\npassword = \"secret\"")?;
            let cfg = load_config(&parse(&["--config", "custom.toml"])).expect("load");
            assert_eq!(cfg.username.as_deref(), Some("admin"));
            assert_eq!(cfg.password.as_deref(), Some("secret"));
            Ok(())
        });
    }

    #[rstest]
    #[case::bad_bind(&["--bind", "not-an-addr"], "bind address not-an-addr is invalid")]
    #[case::tiny_frames(&["--max-packet-size", "1"], "max packet size 1")]
    #[case::huge_frames(&["--max-packet-size", "268435456"], "max packet size 268435456")]
    #[case::orphan_password(&["--password", "secret"], "password is set without a username")]
    fn rejects_invalid_config(#[case] args: &[&str], #[case] expected: &str) {
        Jail::expect_with(|_j| {
            let err = load_config(&parse(args)).expect_err("should fail");
            assert!(err.to_string().contains(expected), "unexpected error: {err}");
            Ok(())
        });
    }

    #[rstest]
    fn reports_malformed_file() {
        Jail::expect_with(|j| {
            j.create_file(DEFAULT_CONFIG_FILE, "max_packet_size = \"lots\"")?;
            let err = load_config(&Cli::default()).expect_err("should fail");
            assert!(matches!(err, ConfigError::Figment(_)));
            Ok(())
        });
    }
}
