//! Exporter configuration: CLI defaults merged with the targets file.
//!
//! The targets file is YAML unless its extension is `.toml`. Keys present
//! in the file override the values passed on the command line.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Target;

pub const DEFAULT_LISTEN_ADDRESS: &str = ":9889";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CONFIG_PATH: &str = "configs/bucki.yml";

/// On-disk config file layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub urls: Vec<Target>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default, rename = "metricspath", alias = "metrics_path")]
    pub metrics_path: Option<String>,
    #[serde(default, rename = "clienttimeout", alias = "client_timeout")]
    pub client_timeout: Option<u64>,
    #[serde(default, rename = "buckimetrics", alias = "only_bucki_metrics")]
    pub only_bucki_metrics: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        // An empty YAML document deserializes to unit, not to a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Fully resolved exporter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    pub listen_address: String,
    pub metrics_path: String,
    pub client_timeout: Duration,
    pub only_bucki_metrics: bool,
    pub targets: Vec<Target>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            client_timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
            only_bucki_metrics: false,
            targets: Vec::new(),
        }
    }
}

impl ExporterConfig {
    /// Read the targets file at `path`, apply it on top of `self` and validate.
    pub fn load(self, path: &Path) -> ConfigResult<Self> {
        let file = FileConfig::from_file(path)?;
        let config = self.merge(file);
        config.validate()?;
        Ok(config)
    }

    /// Apply file values over the current ones.
    pub fn merge(mut self, file: FileConfig) -> Self {
        if let Some(port) = file.port {
            self.listen_address = port;
        }
        if let Some(path) = file.metrics_path {
            self.metrics_path = path;
        }
        if let Some(secs) = file.client_timeout {
            self.client_timeout = Duration::from_secs(secs);
        }
        if let Some(only) = file.only_bucki_metrics {
            self.only_bucki_metrics = only;
        }
        self.targets = file.urls;
        self
    }

    /// Reject configurations the exporter must not start with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.client_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if !self.metrics_path.starts_with('/') || self.metrics_path == "/" {
            return Err(ConfigError::InvalidMetricsPath(self.metrics_path.clone()));
        }
        self.socket_addr()?;

        let mut seen = HashSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            if target.name.is_empty() {
                return Err(ConfigError::EmptyTargetName(index));
            }
            validate_address(target)?;
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.name.clone()));
            }
        }

        if self.targets.is_empty() {
            warn!("no targets configured; every scrape will report exporter metrics only");
        }
        Ok(())
    }

    /// Resolve the listen address. `:PORT` binds all interfaces.
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        let candidate = if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        };
        candidate
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.listen_address.clone()))
    }
}

fn validate_address(target: &Target) -> ConfigResult<()> {
    let invalid = |reason: &str| ConfigError::InvalidAddress {
        name: target.name.clone(),
        address: target.address.clone(),
        reason: reason.to_string(),
    };

    let uri: http::Uri = target
        .address
        .parse()
        .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => return Err(invalid(&format!("unsupported scheme {other}"))),
        None => return Err(invalid("missing scheme")),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}
