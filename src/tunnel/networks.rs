//! Tunnel network membership reconciliation.

use std::collections::{BTreeSet, HashSet};

use bollard::models::{ContainerInspectResponse, EndpointSettings};
use futures::future::{try_join, try_join_all};

use crate::engine;
use crate::error::Result;
use crate::tunnel::{TUNNEL_LOCK, TunnelManager, tunnel_container_name};

/// Connects and disconnects needed to reach the desired network set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPlan {
    pub connect: BTreeSet<String>,
    pub disconnect: BTreeSet<String>,
}

impl NetworkPlan {
    pub fn is_empty(&self) -> bool {
        self.connect.is_empty() && self.disconnect.is_empty()
    }
}

/// Diff current membership against `desired ∪ {default_bridge}`.
///
/// The default bridge is always expected, so it is never disconnected.
pub fn plan_network_changes(
    current: &HashSet<String>,
    desired: &HashSet<String>,
    default_bridge: &str,
) -> NetworkPlan {
    let mut expected: HashSet<&str> = desired.iter().map(String::as_str).collect();
    expected.insert(default_bridge);

    NetworkPlan {
        connect: expected
            .iter()
            .filter(|id| !current.contains(**id))
            .map(|id| id.to_string())
            .collect(),
        disconnect: current
            .iter()
            .filter(|id| !expected.contains(id.as_str()))
            .cloned()
            .collect(),
    }
}

fn attached_network_ids(details: &ContainerInspectResponse) -> HashSet<String> {
    details
        .network_settings
        .as_ref()
        .and_then(|settings| settings.networks.as_ref())
        .map(|networks| {
            networks
                .values()
                .filter_map(|endpoint| endpoint.network_id.clone())
                .collect()
        })
        .unwrap_or_default()
}

impl TunnelManager {
    /// Attach the tunnel for `proxy_port` to exactly `desired` plus the
    /// default bridge, recreating the tunnel first if it has disappeared.
    pub async fn update_networks(
        &self,
        proxy_port: u16,
        desired: &HashSet<String>,
    ) -> Result<NetworkPlan> {
        let name = tunnel_container_name(proxy_port);
        let default_bridge = engine::default_bridge_id(self.engine.as_ref()).await?;

        if engine::inspect_if_exists(self.engine.as_ref(), &name)
            .await?
            .is_none()
        {
            tracing::info!(proxy_port, "Tunnel container missing, recreating");
            self.ensure_running(proxy_port).await?;
        }

        let _guard = TUNNEL_LOCK.lock().await;

        // Re-read membership now that the lock is held.
        let details = self.engine.inspect_container(&name).await?;
        let current = attached_network_ids(&details);
        let plan = plan_network_changes(&current, desired, &default_bridge);

        if plan.is_empty() {
            tracing::debug!(proxy_port, "Tunnel networks already up to date");
            return Ok(plan);
        }

        let connects = plan.connect.iter().map(|network| {
            self.engine
                .connect_network(network, &name, EndpointSettings::default())
        });
        let disconnects = plan.disconnect.iter().map(|network| {
            let name = name.as_str();
            async move {
                match self.engine.disconnect_network(network, name).await {
                    Err(e) if engine::is_not_connected(&e) => {
                        tracing::debug!(network = network.as_str(), "Tunnel already disconnected");
                        Ok(())
                    }
                    other => other,
                }
            }
        });
        try_join(try_join_all(connects), try_join_all(disconnects)).await?;

        tracing::info!(
            proxy_port,
            connected = ?plan.connect,
            disconnected = ?plan.disconnect,
            "Reconciled tunnel networks"
        );
        Ok(plan)
    }
}
