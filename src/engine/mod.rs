//! Container engine access.
//!
//! Everything this crate does to the outside world goes through the
//! [`ContainerEngine`] trait: one method per daemon primitive, returning the
//! raw `bollard` error so callers can classify status codes. [`BollardEngine`]
//! is the production implementation; tests drive the orchestration logic with
//! an in-memory engine instead.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerCreateResponse, ContainerInspectResponse, ContainerSummary, EndpointSettings,
    ImageInspect, Network,
};
use bollard::network::{ConnectNetworkOptions, DisconnectNetworkOptions, ListNetworksOptions};
use bollard::system::Version;
use bytes::Bytes;
use futures::StreamExt;

use crate::error::{InterceptError, Result};

/// Gateway address of the default bridge on a stock Docker install.
pub const DEFAULT_BRIDGE_GATEWAY: &str = "172.17.0.1";

/// Hostname Docker Desktop resolves to the host machine.
pub const DOCKER_HOST_HOSTNAME: &str = "host.docker.internal";

/// Symbolic `--add-host` target understood by engines from 20.10 onwards.
pub const HOST_GATEWAY_TOKEN: &str = "host-gateway";

/// Filters used for network and container listings (`key -> values`).
pub type Filters = HashMap<String, Vec<String>>;

/// The daemon primitives consumed by the replacer and the tunnel manager.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn version(&self) -> std::result::Result<Version, DockerError>;

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError>;

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError>;

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError>;

    async fn stop_container(
        &self,
        id: &str,
        grace: Duration,
    ) -> std::result::Result<(), DockerError>;

    async fn kill_container(&self, id: &str) -> std::result::Result<(), DockerError>;

    async fn remove_container(&self, id: &str) -> std::result::Result<(), DockerError>;

    /// Extract a tar archive into the container filesystem at `path`.
    async fn upload_archive(
        &self,
        id: &str,
        path: &str,
        archive: Bytes,
    ) -> std::result::Result<(), DockerError>;

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> std::result::Result<(), DockerError>;

    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
    ) -> std::result::Result<(), DockerError>;

    async fn list_networks(&self, filters: Filters)
    -> std::result::Result<Vec<Network>, DockerError>;

    async fn list_containers(
        &self,
        all: bool,
        filters: Filters,
    ) -> std::result::Result<Vec<ContainerSummary>, DockerError>;

    async fn inspect_image(&self, image: &str) -> std::result::Result<ImageInspect, DockerError>;

    /// Pull an image, waiting for the pull to complete.
    async fn pull_image(&self, image: &str) -> std::result::Result<(), DockerError>;
}

/// Connect to the local Docker daemon (honours `DOCKER_HOST`).
pub async fn connect_docker() -> std::result::Result<Docker, DockerError> {
    let docker = Docker::connect_with_local_defaults()?;
    docker.ping().await?;
    Ok(docker)
}

/// [`ContainerEngine`] backed by a `bollard` Docker client.
#[derive(Clone)]
pub struct BollardEngine {
    docker: Docker,
}

impl BollardEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local daemon and wrap the client.
    pub async fn connect() -> std::result::Result<Self, DockerError> {
        Ok(Self::new(connect_docker().await?))
    }
}

#[async_trait]
impl ContainerEngine for BollardEngine {
    async fn version(&self) -> std::result::Result<Version, DockerError> {
        self.docker.version().await
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, DockerError> {
        self.docker.inspect_container(id, None).await
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> std::result::Result<ContainerCreateResponse, DockerError> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        };
        self.docker.create_container(Some(options), config).await
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.docker.start_container::<String>(id, None).await
    }

    async fn stop_container(
        &self,
        id: &str,
        grace: Duration,
    ) -> std::result::Result<(), DockerError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        self.docker.stop_container(id, Some(options)).await
    }

    async fn kill_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.docker
            .kill_container(
                id,
                Some(KillContainerOptions {
                    signal: "SIGKILL".to_string(),
                }),
            )
            .await
    }

    async fn remove_container(&self, id: &str) -> std::result::Result<(), DockerError> {
        self.docker
            .remove_container(id, None::<RemoveContainerOptions>)
            .await
    }

    async fn upload_archive(
        &self,
        id: &str,
        path: &str,
        archive: Bytes,
    ) -> std::result::Result<(), DockerError> {
        let options = UploadToContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), archive.into())
            .await
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> std::result::Result<(), DockerError> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            endpoint_config: endpoint,
        };
        self.docker.connect_network(network, options).await
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
    ) -> std::result::Result<(), DockerError> {
        let options = DisconnectNetworkOptions {
            container: container.to_string(),
            force: false,
        };
        self.docker.disconnect_network(network, options).await
    }

    async fn list_networks(
        &self,
        filters: Filters,
    ) -> std::result::Result<Vec<Network>, DockerError> {
        self.docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await
    }

    async fn list_containers(
        &self,
        all: bool,
        filters: Filters,
    ) -> std::result::Result<Vec<ContainerSummary>, DockerError> {
        let options = ListContainersOptions {
            all,
            filters,
            ..Default::default()
        };
        self.docker.list_containers(Some(options)).await
    }

    async fn inspect_image(&self, image: &str) -> std::result::Result<ImageInspect, DockerError> {
        self.docker.inspect_image(image).await
    }

    async fn pull_image(&self, image: &str) -> std::result::Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(status) = info.status {
                tracing::debug!(image, status = status.as_str(), "pull progress");
            }
        }
        Ok(())
    }
}

// ── Status classification ───────────────────────────────────────

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Whether the error means the container is already stopped, gone, or being
/// removed (304/404/409).
pub fn is_already_gone(err: &DockerError) -> bool {
    matches!(status_code(err), Some(304 | 404 | 409))
}

pub fn is_not_found(err: &DockerError) -> bool {
    status_code(err) == Some(404)
}

/// Whether the error means a start was a no-op because the container runs.
pub fn is_not_modified(err: &DockerError) -> bool {
    status_code(err) == Some(304)
}

/// Whether a disconnect failed only because the container is no longer
/// attached (or either side no longer exists).
pub fn is_not_connected(err: &DockerError) -> bool {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => *status_code == 404 || message.contains("is not connected"),
        _ => false,
    }
}

/// Inspect a container, mapping "no such container" to `None`.
pub async fn inspect_if_exists(
    engine: &dyn ContainerEngine,
    id: &str,
) -> Result<Option<ContainerInspectResponse>> {
    match engine.inspect_container(id).await {
        Ok(details) => Ok(Some(details)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Platform and host gateway ───────────────────────────────────

/// Host platform the engine runs containers on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "darwin",
            Self::Windows => "win32",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an engine version string is at least 20.10, the first release
/// that resolves the `host-gateway` token in extra hosts.
pub fn engine_supports_host_gateway(version: &str) -> bool {
    let mut parts = version
        .trim_start_matches('v')
        .split(['.', '-', '+'])
        .map(|part| part.parse::<u32>());
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => (major, minor) >= (20, 10),
        _ => false,
    }
}

fn builtin_bridge_filters() -> Filters {
    HashMap::from([
        ("driver".to_string(), vec!["bridge".to_string()]),
        ("type".to_string(), vec!["builtin".to_string()]),
    ])
}

/// Gateway IP of the builtin bridge network, falling back to the stock
/// default when the engine reports none.
pub async fn bridge_gateway(engine: &dyn ContainerEngine) -> Result<String> {
    let networks = engine.list_networks(builtin_bridge_filters()).await?;
    let gateway = networks
        .iter()
        .filter_map(|network| network.ipam.as_ref()?.config.as_ref())
        .flatten()
        .find_map(|config| config.gateway.clone().filter(|g| !g.is_empty()));
    Ok(gateway.unwrap_or_else(|| DEFAULT_BRIDGE_GATEWAY.to_string()))
}

/// Id of the engine's default bridge network.
pub async fn default_bridge_id(engine: &dyn ContainerEngine) -> Result<String> {
    let networks = engine.list_networks(builtin_bridge_filters()).await?;
    networks
        .iter()
        .find(|network| network.name.as_deref() == Some("bridge"))
        .or_else(|| networks.first())
        .and_then(|network| network.id.clone())
        .ok_or(InterceptError::NoDefaultBridge)
}

/// Address a container can use to reach services listening on the host.
pub async fn host_address(engine: &dyn ContainerEngine, platform: Platform) -> Result<String> {
    match platform {
        Platform::Linux => bridge_gateway(engine).await,
        _ => Ok(DOCKER_HOST_HOSTNAME.to_string()),
    }
}
