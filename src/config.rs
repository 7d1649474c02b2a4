//! Process configuration.
//!
//! Read from a YAML file. Every field has a default, so an empty file (or no
//! file at the default location) yields a working configuration against a
//! local database with the pull sink.
//!
//! ```yaml
//! poll_interval: 60
//! namespace: eqemu
//! database:
//!   host: db.internal
//!   username: exporter
//!   password: hunter2
//!   name: peq
//! sink:
//!   type: push
//!   url: http://influx.internal:8086
//!   database: eqemu
//!   tags:
//!     server: live
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{self, Category};
use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Path the binary reads when `--config` is not given.
pub const DEFAULT_PATH: &str = "eqemu-exporter.yml";

/// Connection settings of the MySQL data source.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Database (schema) name.
    pub name: String,
    /// Upper bound of pooled connections shared by all poll loops.
    pub max_connections: u32,
    /// Seconds to wait for a connection before a query fails.
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            host: "127.0.0.1".to_owned(),
            port: 3306,
            username: "eqemu".to_owned(),
            password: String::new(),
            name: "peq".to_owned(),
            max_connections: 4,
            connect_timeout: 10,
        }
    }
}

/// Settings of the pull sink's HTTP endpoint.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PullConfig {
    /// Address the scrape endpoint listens on.
    pub listen_address: SocketAddr,
    /// Path of the scrape endpoint.
    pub path: String,
}

impl Default for PullConfig {
    fn default() -> Self {
        PullConfig {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8081)),
            path: "/metrics".to_owned(),
        }
    }
}

/// Settings of the push sink.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PushConfig {
    /// Base URL of the endpoint; lines go to `{url}/write`.
    pub url: String,
    /// Target database.
    pub database: String,
    /// User name. Credentials are only sent when this is set.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Tags appended to every line after the family labels.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Request timeout in seconds.
    #[serde(default = "default_push_timeout")]
    pub timeout: u64,
}

fn default_push_timeout() -> u64 {
    10
}

/// Where observations are published.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Serve a registry for scraping.
    Pull(PullConfig),
    /// Post line protocol to a remote endpoint.
    Push(PushConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Pull(PullConfig::default())
    }
}

/// The exporter configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between two iterations of a poll loop.
    pub poll_interval: u64,
    /// Seconds in-flight iterations may take to finish on shutdown.
    pub drain_timeout: u64,
    /// Prefix of every metric and series name.
    pub namespace: Option<String>,
    /// Data source.
    pub database: DatabaseConfig,
    /// Sink.
    pub sink: SinkConfig,
    /// Seconds since last login for a character to count as online.
    pub online_window: u64,
    /// Accounts at or above this status are excluded from currency totals.
    pub status_threshold: i64,
    /// Item categories of the per-category family.
    pub categories: Vec<Category>,
    /// Logging.
    pub logging: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval: 60,
            drain_timeout: 5,
            namespace: None,
            database: DatabaseConfig::default(),
            sink: SinkConfig::default(),
            online_window: 600,
            status_threshold: 150,
            categories: catalog::default_categories(),
            logging: LogConfig::default(),
        }
    }
}

impl Config {
    /// Parse and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&contents, path)
    }

    /// Load the configuration the binary runs with.
    ///
    /// Without an explicit path the default path is tried, and a missing file
    /// there means all defaults. An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => match Self::from_path(Path::new(DEFAULT_PATH)) {
                Err(ConfigError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    Ok(Self::default())
                }
                result => result,
            },
        }
    }

    fn from_yaml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty document is null, not an empty mapping.
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges which the types can not express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval == 0 {
            return Err(ConfigError::Invalid("poll_interval must be positive".to_owned()));
        }
        if self.online_window == 0 {
            return Err(ConfigError::Invalid("online_window must be positive".to_owned()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".to_owned(),
            ));
        }
        if let Some(namespace) = &self.namespace {
            if !crate::encoding::is_valid_legacy_metric_name(namespace) {
                return Err(ConfigError::Invalid(format!(
                    "namespace {namespace:?} is not a valid metric name"
                )));
            }
        }
        match &self.sink {
            SinkConfig::Pull(pull) if !pull.path.starts_with('/') => Err(ConfigError::Invalid(
                format!("sink.path {:?} must start with '/'", pull.path),
            )),
            SinkConfig::Push(push) if push.url.is_empty() => {
                Err(ConfigError::Invalid("sink.url must be set".to_owned()))
            }
            SinkConfig::Push(push) if push.timeout == 0 => {
                Err(ConfigError::Invalid("sink.timeout must be positive".to_owned()))
            }
            _ => Ok(()),
        }
    }

    /// [`Config::poll_interval`] as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// [`Config::drain_timeout`] as a duration.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout)
    }

    /// [`Config::online_window`] as a duration.
    pub fn online_window(&self) -> Duration {
        Duration::from_secs(self.online_window)
    }
}
