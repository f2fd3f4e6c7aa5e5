//! Error types for container interception.

use std::path::PathBuf;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Errors raised by the container replacer and the tunnel manager.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    /// An environment entry had no `=` separator.
    #[error("Malformed environment entry (missing '='): {entry}")]
    MalformedEnvEntry { entry: String },

    /// A call to the container engine failed.
    #[error("Container engine error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// The tunnel container has no loopback binding for its tunnel port.
    #[error("No loopback port mapping found for tunnel container {container}")]
    NoPortMapped { container: String },

    #[error("Default bridge network not found")]
    NoDefaultBridge,

    #[error("Failed to pack override archive from {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk override directory: {0}")]
    Walk(#[from] walkdir::Error),
}

impl InterceptError {
    /// HTTP status of the engine response, if this is an engine server error.
    pub fn engine_status(&self) -> Option<u16> {
        match self {
            Self::Engine(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => Some(*status_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, InterceptError>;
