//! SOCKS tunnel sidecar management.
//!
//! Each proxy instance (identified by its port) gets at most one tunnel
//! container, named deterministically from the port and labelled with it.
//! The tunnel is attached to every network that has an intercepted
//! container, so the proxy can reach into networks it is not a member of.
//!
//! Supported operations:
//! - **prepare** - best-effort pre-pull of the tunnel image
//! - **ensure_running** - create and/or start the tunnel container
//! - **update_networks** - converge network membership to a desired set
//! - **get_port** - host port of the loopback-only tunnel binding
//! - **stop_all** - kill and remove tunnels for one proxy or all of them
//!
//! All lifecycle and membership changes run under one process-wide lock,
//! held across every engine call of the operation.
mod lifecycle;
mod networks;
mod teardown;

pub use networks::{NetworkPlan, plan_network_changes};

use std::sync::{Arc, LazyLock};

use tokio::sync::Mutex;

use crate::engine::{ContainerEngine, Platform};
use crate::error::ConfigError;

/// Image run by the tunnel container.
pub const DEFAULT_TUNNEL_IMAGE: &str = "httptoolkit/docker-socks-tunnel:v1.2.0";

/// Label carrying the proxy port of a tunnel container.
pub const TUNNEL_LABEL: &str = "tech.httptoolkit.docker.tunnel";

/// SOCKS port inside the tunnel container.
pub const TUNNEL_PORT: &str = "1080/tcp";

/// Host interface the tunnel port is published on.
pub const LOOPBACK: &str = "127.0.0.1";

/// Serializes tunnel operations across every proxy port in this process.
static TUNNEL_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Deterministic tunnel container name for a proxy port.
pub fn tunnel_container_name(proxy_port: u16) -> String {
    format!("httptoolkit-docker-tunnel-{proxy_port}")
}

/// Which tunnels a teardown applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelScope {
    All,
    Proxy(u16),
}

impl TunnelScope {
    /// Label filter selecting the tunnels in scope.
    pub fn label_filter(&self) -> String {
        match self {
            Self::All => TUNNEL_LABEL.to_string(),
            Self::Proxy(port) => format!("{TUNNEL_LABEL}={port}"),
        }
    }
}

impl std::str::FromStr for TunnelScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Proxy).map_err(|e| ConfigError::InvalidValue {
            key: "scope".to_string(),
            message: format!("expected 'all' or a proxy port: {e}"),
        })
    }
}

/// Tunnel container settings.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub image: String,
    /// Extra host mappings are only added on Linux hosts.
    pub platform: Platform,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_TUNNEL_IMAGE.to_string(),
            platform: Platform::current(),
        }
    }
}

/// Manages tunnel containers against one engine.
#[derive(Clone)]
pub struct TunnelManager {
    engine: Arc<dyn ContainerEngine>,
    config: TunnelConfig,
}

impl TunnelManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: TunnelConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }
}
