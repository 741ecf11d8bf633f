//! Error types for the fan controller

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the fan controller
pub type Result<T> = std::result::Result<T, PwmFanError>;

/// Main error type for the fan controller.
///
/// Every variant is fatal to the process: the controller stops rather than
/// keep driving the fan from bad data.
#[derive(Error, Debug)]
pub enum PwmFanError {
    #[error("IO error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value {value:?} read from {source_name}")]
    Parse { source_name: String, value: String },

    #[error("PWM control file {} not found", .0.display())]
    MissingControl(PathBuf),

    #[error("{0} kernel module found. Module must be blacklisted!")]
    ModuleLoaded(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No such file or directory: '{command}'")]
    CommandNotFound { command: String },

    #[error("Can not read temperature from {0}")]
    SensorUnavailable(String),
}

impl PwmFanError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a parse error for a value read from `source_name`
    pub fn parse(source_name: impl std::fmt::Display, value: &str) -> Self {
        Self::Parse {
            source_name: source_name.to_string(),
            value: value.trim().to_string(),
        }
    }
}
