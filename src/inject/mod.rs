//! In-place container interception.
//!
//! A running container is stopped, removed, and recreated from its own
//! inspected configuration with proxy settings appended to its environment.
//! The CA certificate and override files reach the new container either as
//! read-only bind mounts ([`InjectionMode::Mount`]) or by extracting an
//! archive into its filesystem before it starts ([`InjectionMode::Inject`]).
//!
//! ```text
//!  inspect ──▶ stop ──▶ remove ──▶ create ──▶ connect extra networks
//!                                                  │
//!                                  start ◀── upload archive (inject mode)
//! ```
//!
//! There is no rollback: once the original container is removed, a failure
//! in any later step leaves it gone and is reported to the caller.

pub mod archive;
pub mod overrides;
pub mod replace;

pub use archive::pack_overrides;
pub use overrides::{OverrideContext, OverrideEnv, ProxyEnvOverrides};
pub use replace::{InterceptionConfig, ReplacementSpec, derive_replacement, restart_and_inject};

use crate::error::ConfigError;

/// Root of everything injected into an intercepted container.
pub const INJECTIONS_ROOT: &str = "/http-toolkit-injections";

/// In-container directory holding the override files.
pub const INJECTED_OVERRIDES_PATH: &str = "/http-toolkit-injections/overrides";

/// In-container path of the proxy CA certificate.
pub const INJECTED_CA_PATH: &str = "/http-toolkit-injections/ca.pem";

/// How override files are exposed to the recreated container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectionMode {
    /// Read-only bind mounts from the host.
    #[default]
    Mount,
    /// Files copied into the container filesystem before start.
    Inject,
}

impl InjectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Inject => "inject",
        }
    }
}

impl std::fmt::Display for InjectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InjectionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mount" => Ok(Self::Mount),
            "inject" => Ok(Self::Inject),
            _ => Err(ConfigError::InvalidValue {
                key: "INTERCEPT_MODE".to_string(),
                message: format!("unknown mode: {s}, expected 'mount' or 'inject'"),
            }),
        }
    }
}
