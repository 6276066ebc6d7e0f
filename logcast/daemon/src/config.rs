//! Daemon configuration
//!
//! Values are layered, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, or `$XDG_CONFIG_HOME/logcast/config.toml` if present)
//! 3. Environment variables
//! 4. Command-line flags ([`ConfigOverrides`])
//!
//! ```toml
//! listen_addr = "0.0.0.0:8080"
//! base_path = "/logs"
//! ingest_socket = "/run/logcast/ingest.sock"
//! event_capacity = 1024
//!
//! [broadcast]
//! queue_capacity = 1000
//! throttle_ms = 1000
//! history_warn_lines = 100000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use logcast_core::dispatcher::DEFAULT_EVENT_CAPACITY;
use logcast_core::{BroadcastConfig, ConfigError as BroadcastConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Broadcast settings are unusable
    #[error(transparent)]
    Broadcast(#[from] BroadcastConfigError),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Where the winning configuration values came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// On-disk representation; every field optional so partial files work
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DaemonToml {
    listen_addr: Option<String>,
    base_path: Option<String>,
    ingest_socket: Option<PathBuf>,
    event_capacity: Option<usize>,
    broadcast: Option<BroadcastConfig>,
}

/// Values supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// `--listen`
    pub listen_addr: Option<SocketAddr>,
    /// `--base-path`
    pub base_path: Option<String>,
    /// `--ingest-socket`
    pub ingest_socket: Option<PathBuf>,
    /// `--throttle-ms`
    pub throttle_ms: Option<u64>,
}

/// Fully resolved daemon configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Address the HTTP server binds
    pub listen_addr: SocketAddr,
    /// Prefix under which all routes are mounted ("" for none)
    pub base_path: String,
    /// Unix socket on which jobs deliver log events
    pub ingest_socket: PathBuf,
    /// Capacity of the ingest-to-dispatcher channel
    pub event_capacity: usize,
    /// Store and session tunables
    pub broadcast: BroadcastConfig,
    /// Config file that was read, if any
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_path: String::new(),
            ingest_socket: default_ingest_socket_path(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            broadcast: BroadcastConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl DaemonConfig {
    /// Highest-priority layer that set any value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Apply command-line flags on top of everything else
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(addr) = overrides.listen_addr {
            self.listen_addr = addr;
            self.source = ConfigSource::Cli;
        }
        if let Some(ref base) = overrides.base_path {
            self.base_path = normalize_base_path(base);
            self.source = ConfigSource::Cli;
        }
        if let Some(ref path) = overrides.ingest_socket {
            self.ingest_socket.clone_from(path);
            self.source = ConfigSource::Cli;
        }
        if let Some(ms) = overrides.throttle_ms {
            self.broadcast.throttle_ms = ms;
            self.source = ConfigSource::Cli;
        }
    }

    /// Check the resolved values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broadcast.validate()?;
        if self.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        if self.ingest_socket.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "ingest_socket must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_toml(&mut self, toml: DaemonToml) -> Result<(), ConfigError> {
        if let Some(addr) = toml.listen_addr {
            self.listen_addr = parse_listen_addr(&addr)?;
        }
        if let Some(base) = toml.base_path {
            self.base_path = normalize_base_path(&base);
        }
        if let Some(path) = toml.ingest_socket {
            self.ingest_socket = path;
        }
        if let Some(capacity) = toml.event_capacity {
            self.event_capacity = capacity;
        }
        if let Some(broadcast) = toml.broadcast {
            self.broadcast = broadcast;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(addr) = std::env::var("LOGCAST_LISTEN_ADDR") {
            self.listen_addr = parse_listen_addr(&addr)?;
            self.source = ConfigSource::Env;
        }
        if let Ok(base) = std::env::var("LOGCAST_BASE_PATH") {
            self.base_path = normalize_base_path(&base);
            self.source = ConfigSource::Env;
        }
        if let Ok(path) = std::env::var("LOGCAST_INGEST_SOCKET") {
            self.ingest_socket = PathBuf::from(path);
            self.source = ConfigSource::Env;
        }

        let broadcast = self.broadcast.clone().with_env_overrides()?;
        if broadcast != self.broadcast {
            self.broadcast = broadcast;
            self.source = ConfigSource::Env;
        }
        Ok(())
    }
}

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/logcast/config.toml` or
/// `~/.config/logcast/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("logcast").join("config.toml"))
}

/// Get the default ingest socket path
///
/// Uses `XDG_RUNTIME_DIR` if available, otherwise `/tmp/logcast-$UID/`
#[must_use]
pub fn default_ingest_socket_path() -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir() {
        runtime_dir.join("logcast").join("ingest.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/logcast-{uid}/ingest.sock"))
    }
}

/// Load configuration from defaults, file and environment
///
/// An explicitly requested file must exist; the default location is
/// optional. CLI overrides are applied afterwards by the caller.
pub fn load_config(explicit: Option<&Path>) -> Result<DaemonConfig, ConfigError> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "config file does not exist",
                    ),
                });
            }
            load_config_from_path(Some(path))
        }
        None => load_config_from_path(default_config_path().as_deref()),
    }
}

/// Load configuration from a specific path
///
/// A path that does not exist falls back to defaults.
pub fn load_config_from_path(path: Option<&Path>) -> Result<DaemonConfig, ConfigError> {
    let mut config = DaemonConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.to_path_buf(),
                    source: e,
                })?;
            let toml: DaemonToml = toml::from_str(&content)?;
            config.apply_toml(toml)?;
            config.config_file_path = Some(config_path.to_path_buf());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
        }
    }

    config.apply_env()?;
    Ok(config)
}

/// Normalize a route prefix: leading slash, no trailing slash, "" for root
#[must_use]
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_listen_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("listen_addr {raw:?}: {e}")))
}
