//! Tunnel port lookup and teardown.

use std::collections::HashMap;

use bollard::models::ContainerInspectResponse;
use futures::future::join_all;

use crate::engine;
use crate::error::{InterceptError, Result};
use crate::tunnel::{
    LOOPBACK, TUNNEL_LOCK, TUNNEL_PORT, TunnelManager, TunnelScope, tunnel_container_name,
};

/// Host port published on loopback for the tunnel's SOCKS port.
fn loopback_port(details: &ContainerInspectResponse) -> Option<u16> {
    details
        .network_settings
        .as_ref()?
        .ports
        .as_ref()?
        .get(TUNNEL_PORT)?
        .as_ref()?
        .iter()
        .find(|binding| binding.host_ip.as_deref() == Some(LOOPBACK))?
        .host_port
        .as_deref()?
        .parse()
        .ok()
}

impl TunnelManager {
    /// Local port to reach the tunnel for `proxy_port` on.
    ///
    /// Recreates the tunnel if it has disappeared.
    pub async fn get_port(&self, proxy_port: u16) -> Result<u16> {
        let name = tunnel_container_name(proxy_port);
        let details = match engine::inspect_if_exists(self.engine.as_ref(), &name).await? {
            Some(details) => details,
            None => {
                self.ensure_running(proxy_port).await?;
                self.engine.inspect_container(&name).await?
            }
        };
        loopback_port(&details).ok_or(InterceptError::NoPortMapped { container: name })
    }

    /// Kill and remove every tunnel in `scope`.
    ///
    /// Individual kill/remove failures are logged and skipped so one stuck
    /// container does not leave the others running. Returns how many
    /// tunnel containers were found.
    pub async fn stop_all(&self, scope: TunnelScope) -> Result<usize> {
        let _guard = TUNNEL_LOCK.lock().await;

        let filters = HashMap::from([("label".to_string(), vec![scope.label_filter()])]);
        let containers = self.engine.list_containers(true, filters).await?;
        let ids: Vec<String> = containers.into_iter().filter_map(|c| c.id).collect();

        join_all(ids.iter().map(|id| async move {
            if let Err(e) = self.engine.kill_container(id).await {
                if engine::is_already_gone(&e) {
                    tracing::debug!(container_id = %id, "Tunnel container not running");
                } else {
                    tracing::warn!(container_id = %id, error = %e, "Failed to kill tunnel container");
                }
            }
            if let Err(e) = self.engine.remove_container(id).await {
                if engine::is_already_gone(&e) {
                    tracing::debug!(container_id = %id, "Tunnel container already removed");
                } else {
                    tracing::warn!(container_id = %id, error = %e, "Failed to remove tunnel container");
                }
            }
        }))
        .await;

        tracing::info!(scope = ?scope, count = ids.len(), "Stopped tunnel containers");
        Ok(ids.len())
    }
}
