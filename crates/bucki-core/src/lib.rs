pub mod config;
pub mod error;
pub mod types;

pub use config::{ExporterConfig, FileConfig};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
