//! Tunnel container creation and start-up.

use std::collections::HashMap;

use bollard::container::Config;
use bollard::models::{HostConfig, PortBinding};

use crate::engine::{self, DOCKER_HOST_HOSTNAME, HOST_GATEWAY_TOKEN, Platform};
use crate::error::Result;
use crate::tunnel::{LOOPBACK, TUNNEL_LABEL, TUNNEL_LOCK, TUNNEL_PORT, TunnelManager};

impl TunnelManager {
    /// Pre-pull the tunnel image. Failures are logged and otherwise ignored.
    pub async fn prepare(&self) {
        if let Err(e) = self.engine.pull_image(&self.config.image).await {
            tracing::warn!(image = self.config.image.as_str(), error = %e, "Failed to pre-pull tunnel image");
        }
    }

    /// Make sure the tunnel container for `proxy_port` exists and runs.
    pub async fn ensure_running(&self, proxy_port: u16) -> Result<()> {
        let _guard = TUNNEL_LOCK.lock().await;

        self.ensure_image().await?;

        let name = super::tunnel_container_name(proxy_port);
        let running = match engine::inspect_if_exists(self.engine.as_ref(), &name).await? {
            Some(details) => details
                .state
                .and_then(|state| state.running)
                .unwrap_or(false),
            None => {
                let config = self.tunnel_container_config(proxy_port).await?;
                self.engine.create_container(&name, config).await?;
                tracing::info!(proxy_port, container = name.as_str(), "Created tunnel container");
                false
            }
        };

        if running {
            tracing::debug!(proxy_port, "Tunnel container already running");
            return Ok(());
        }

        match self.engine.start_container(&name).await {
            Ok(()) => {}
            Err(e) if engine::is_not_modified(&e) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(proxy_port, container = name.as_str(), "Started tunnel container");
        Ok(())
    }

    async fn ensure_image(&self) -> Result<()> {
        let image = self.config.image.as_str();
        if let Err(e) = self.engine.inspect_image(image).await {
            tracing::debug!(image, error = %e, "Tunnel image not available locally, pulling");
            self.engine.pull_image(image).await?;
        }
        Ok(())
    }

    /// Target for `host.docker.internal` inside the tunnel.
    async fn host_gateway(&self) -> Result<String> {
        let version = self.engine.version().await?;
        if engine::engine_supports_host_gateway(version.version.as_deref().unwrap_or_default()) {
            Ok(HOST_GATEWAY_TOKEN.to_string())
        } else {
            engine::bridge_gateway(self.engine.as_ref()).await
        }
    }

    async fn tunnel_container_config(&self, proxy_port: u16) -> Result<Config<String>> {
        let extra_hosts = if self.config.platform == Platform::Linux {
            let gateway = self.host_gateway().await?;
            Some(vec![format!("{DOCKER_HOST_HOSTNAME}:{gateway}")])
        } else {
            None
        };

        let port_bindings = HashMap::from([(
            TUNNEL_PORT.to_string(),
            Some(vec![PortBinding {
                host_ip: Some(LOOPBACK.to_string()),
                host_port: None,
            }]),
        )]);

        Ok(Config {
            image: Some(self.config.image.clone()),
            labels: Some(HashMap::from([(
                TUNNEL_LABEL.to_string(),
                proxy_port.to_string(),
            )])),
            exposed_ports: Some(HashMap::from([(TUNNEL_PORT.to_string(), HashMap::new())])),
            host_config: Some(HostConfig {
                auto_remove: Some(true),
                extra_hosts,
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
