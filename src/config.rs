//! Configuration defaults & deserializer.
//!
//! All fields have a default and are listed in `default-config.toml`.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Server configuration
#[derive(Deserialize, Debug, Default)]
pub struct DataupConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DataupConfig {
    pub const DEFAULT_CONFIG: &'static str = include_str!("./default-config.toml");

    /// Load a config from a file.
    ///
    /// Relative paths inside the file are resolved against its directory.
    pub fn load_from_file(config_path: &Path) -> anyhow::Result<Self> {
        let config_path = std::fs::canonicalize(config_path)
            .with_context(|| format!("config file `{}` not found", config_path.display()))?;
        let config_string = std::fs::read_to_string(&config_path)?;
        let mut config: Self = toml::from_str(&config_string)
            .with_context(|| format!("invalid config file `{}`", config_path.display()))?;

        if let Some(parent) = config_path.parent() {
            config.storage.set_relative_to(parent);
        }
        Ok(config)
    }
}

/// Network settings
#[derive(Deserialize, Debug)]
pub struct NetworkConfig {
    /// IP and port to bind to
    #[serde(default = "NetworkConfig::default_server_addr")]
    pub server_addr: SocketAddr,

    /// Maximum request body size, in bytes
    #[serde(default = "NetworkConfig::default_request_body_limit")]
    pub request_body_limit: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_addr: Self::default_server_addr(),
            request_body_limit: Self::default_request_body_limit(),
        }
    }
}

impl NetworkConfig {
    fn default_server_addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 8080))
    }

    fn default_request_body_limit() -> usize {
        100 * 1024 * 1024
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Filesystem,
}

/// Blob storage settings
#[derive(Deserialize, Debug)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for the filesystem backend
    #[serde(default = "StorageConfig::default_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: Self::default_path(),
        }
    }
}

impl StorageConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("./videos")
    }

    fn set_relative_to(&mut self, root_path: &Path) {
        self.path = root_path.join(&self.path);
    }
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Logging settings
#[derive(Deserialize, Debug)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default = "LoggingConfig::default_http")]
    pub http: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            http: Self::default_http(),
        }
    }
}

impl LoggingConfig {
    // request spans get noisy
    fn default_http() -> LogLevel {
        LogLevel::Warn
    }

    /// Convert this logging config to a tracing env filter
    pub fn to_env_filter(&self) -> String {
        [
            format!("dataup={}", self.level),
            format!("tower_http={}", self.http),
            LogLevel::Warn.to_string(),
        ]
        .join(",")
    }
}
