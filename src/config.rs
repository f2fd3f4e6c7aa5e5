//! Configuration for container interception.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::Platform;
use crate::error::ConfigError;
use crate::inject::InjectionMode;
use crate::inject::replace::DEFAULT_STOP_GRACE;
use crate::tunnel::{DEFAULT_TUNNEL_IMAGE, TunnelConfig};

/// Main configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub tunnel: TunnelConfig,
    pub injection: InjectionConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            tunnel: tunnel_config_from_env()?,
            injection: InjectionConfig::from_env()?,
        })
    }
}

/// Defaults for container replacement.
#[derive(Debug, Clone)]
pub struct InjectionConfig {
    pub mode: InjectionMode,
    /// Host directory of override files.
    pub overrides_dir: PathBuf,
    pub stop_grace: Duration,
}

impl InjectionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            mode: optional_env("INTERCEPT_MODE")?
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default(),
            overrides_dir: optional_env("INTERCEPT_OVERRIDES_DIR")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("overrides")),
            stop_grace: Duration::from_secs(parse_optional_env(
                "INTERCEPT_STOP_GRACE_SECS",
                DEFAULT_STOP_GRACE.as_secs(),
            )?),
        })
    }
}

fn tunnel_config_from_env() -> Result<TunnelConfig, ConfigError> {
    Ok(TunnelConfig {
        image: optional_env("INTERCEPT_TUNNEL_IMAGE")?
            .unwrap_or_else(|| DEFAULT_TUNNEL_IMAGE.to_string()),
        platform: Platform::current(),
    })
}

// Helper functions

fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
