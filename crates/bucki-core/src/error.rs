//! Error types for exporter configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that stop the exporter before it starts serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("duplicate target name: {0}")]
    DuplicateTarget(String),

    #[error("target at position {0} has an empty name")]
    EmptyTargetName(usize),

    #[error("target {name}: invalid address {address:?}: {reason}")]
    InvalidAddress {
        name: String,
        address: String,
        reason: String,
    },

    #[error("client timeout must be greater than zero")]
    ZeroTimeout,

    #[error("invalid metrics path {0:?}: must start with '/' and must not be '/'")]
    InvalidMetricsPath(String),

    #[error("invalid listen address {0:?}")]
    InvalidListenAddress(String),
}
