//! In-memory container engine for integration tests.
//!
//! Records every call, keeps just enough container/network state to behave
//! like a daemon (auto-remove, default bridge attachment, dynamic port
//! assignment, label filters), and can be told to fail specific operations
//! with a given status code.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::Config;
use bollard::errors::Error as DockerError;
use bollard::system::Version;
use bollard::models::{
    ContainerConfig, ContainerCreateResponse, ContainerInspectResponse, ContainerState,
    ContainerSummary, EndpointSettings, ImageInspect, Ipam, IpamConfig, Network,
    NetworkSettings, PortBinding,
};
use bytes::Bytes;

use container_intercept::engine::{ContainerEngine, Filters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Version,
    Inspect,
    Create,
    Start,
    Stop,
    Kill,
    Remove,
    Upload,
    Connect,
    Disconnect,
    ListNetworks,
    ListContainers,
    InspectImage,
    Pull,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Version,
    Inspect(String),
    Create(String),
    Start(String),
    Stop(String, Duration),
    Kill(String),
    Remove(String),
    Upload { container: String, path: String },
    Connect {
        network: String,
        container: String,
        endpoint: EndpointSettings,
    },
    Disconnect { network: String, container: String },
    ListNetworks(Filters),
    ListContainers(Filters),
    InspectImage(String),
    Pull(String),
}

struct KnownNetwork {
    id: String,
    name: String,
    gateway: Option<String>,
    builtin: bool,
}

#[derive(Default)]
struct State {
    containers: Vec<ContainerInspectResponse>,
    networks: Vec<KnownNetwork>,
    images: HashSet<String>,
    version: String,
    calls: Vec<Call>,
    created: Vec<(String, Config<String>)>,
    uploads: Vec<Bytes>,
    failures: HashMap<Op, (u16, String)>,
    next_id: usize,
    next_port: u16,
}

pub struct RecordingEngine {
    state: Mutex<State>,
}

pub fn server_error(status_code: u16, message: &str) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code,
        message: message.to_string(),
    }
}

fn not_found(what: &str) -> DockerError {
    server_error(404, &format!("No such container: {what}"))
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                version: "24.0.7".to_string(),
                next_port: 49153,
                ..Default::default()
            }),
        }
    }

    // ── Setup ───────────────────────────────────────────────────

    pub fn with_version(self, version: &str) -> Self {
        self.state.lock().unwrap().version = version.to_string();
        self
    }

    /// Register the builtin default bridge network.
    pub fn with_default_bridge(self, id: &str, gateway: &str) -> Self {
        self.state.lock().unwrap().networks.push(KnownNetwork {
            id: id.to_string(),
            name: "bridge".to_string(),
            gateway: Some(gateway.to_string()),
            builtin: true,
        });
        self
    }

    /// Register a user-defined network.
    pub fn with_network(self, id: &str, name: &str) -> Self {
        self.state.lock().unwrap().networks.push(KnownNetwork {
            id: id.to_string(),
            name: name.to_string(),
            gateway: None,
            builtin: false,
        });
        self
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string());
        self
    }

    pub fn insert_container(&self, container: ContainerInspectResponse) {
        self.state.lock().unwrap().containers.push(container);
    }

    /// Make every call of `op` fail with `status_code` until cleared.
    pub fn fail(&self, op: Op, status_code: u16, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(op, (status_code, message.to_string()));
    }

    pub fn clear_failure(&self, op: Op) {
        self.state.lock().unwrap().failures.remove(&op);
    }

    // ── Inspection ──────────────────────────────────────────────

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(|c| pred(c))
    }

    pub fn created(&self) -> Vec<(String, Config<String>)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn uploads(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn container(&self, key: &str) -> Option<ContainerInspectResponse> {
        let state = self.state.lock().unwrap();
        find(&state, key).map(|i| state.containers[i].clone())
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter_map(|c| c.name.clone())
            .map(|n| n.trim_start_matches('/').to_string())
            .collect()
    }

    /// Network ids a container is attached to.
    pub fn attached_networks(&self, key: &str) -> HashSet<String> {
        self.container(key)
            .and_then(|c| c.network_settings)
            .and_then(|s| s.networks)
            .map(|n| n.values().filter_map(|e| e.network_id.clone()).collect())
            .unwrap_or_default()
    }

    fn begin(&self, op: Op, call: Call) -> Result<std::sync::MutexGuard<'_, State>, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some((status, message)) = state.failures.get(&op) {
            return Err(server_error(*status, message));
        }
        Ok(state)
    }
}

fn find(state: &State, key: &str) -> Option<usize> {
    state.containers.iter().position(|c| {
        c.id.as_deref() == Some(key)
            || c.name.as_deref().map(|n| n.trim_start_matches('/')) == Some(key)
    })
}

fn resolve_network(state: &State, key: &str) -> (String, String) {
    state
        .networks
        .iter()
        .find(|n| n.id == key || n.name == key)
        .map(|n| (n.id.clone(), n.name.clone()))
        .unwrap_or_else(|| (key.to_string(), key.to_string()))
}

fn is_running(container: &ContainerInspectResponse) -> bool {
    container
        .state
        .as_ref()
        .and_then(|s| s.running)
        .unwrap_or(false)
}

fn set_running(container: &mut ContainerInspectResponse, running: bool) {
    container.state = Some(ContainerState {
        running: Some(running),
        ..Default::default()
    });
}

fn auto_removes(container: &ContainerInspectResponse) -> bool {
    container
        .host_config
        .as_ref()
        .and_then(|h| h.auto_remove)
        .unwrap_or(false)
}

fn matches_label(container: &ContainerInspectResponse, filter: &str) -> bool {
    let labels = container
        .config
        .as_ref()
        .and_then(|c| c.labels.clone())
        .unwrap_or_default();
    match filter.split_once('=') {
        Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
        None => labels.contains_key(filter),
    }
}

#[async_trait]
impl ContainerEngine for RecordingEngine {
    async fn version(&self) -> Result<Version, DockerError> {
        let state = self.begin(Op::Version, Call::Version)?;
        Ok(Version {
            version: Some(state.version.clone()),
            ..Default::default()
        })
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        let state = self.begin(Op::Inspect, Call::Inspect(id.to_string()))?;
        find(&state, id)
            .map(|i| state.containers[i].clone())
            .ok_or_else(|| not_found(id))
    }

    async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<ContainerCreateResponse, DockerError> {
        let mut state = self.begin(Op::Create, Call::Create(name.to_string()))?;
        if find(&state, name).is_some() {
            return Err(server_error(409, "Conflict. The container name is already in use"));
        }
        state.created.push((name.to_string(), config.clone()));
        state.next_id += 1;
        let id = format!("new-{}", state.next_id);

        let mut networks = HashMap::new();
        match config
            .networking_config
            .as_ref()
            .map(|n| &n.endpoints_config)
        {
            Some(endpoints) => {
                for (key, endpoint) in endpoints {
                    let (network_id, network_name) = resolve_network(&state, key);
                    let mut endpoint = endpoint.clone();
                    endpoint.network_id.get_or_insert(network_id);
                    networks.insert(network_name, endpoint);
                }
            }
            None => {
                if let Some(bridge) = state.networks.iter().find(|n| n.name == "bridge") {
                    networks.insert(
                        bridge.name.clone(),
                        EndpointSettings {
                            network_id: Some(bridge.id.clone()),
                            ..Default::default()
                        },
                    );
                }
            }
        }

        let mut ports = HashMap::new();
        if let Some(bindings) = config
            .host_config
            .as_ref()
            .and_then(|h| h.port_bindings.clone())
        {
            for (port, bindings) in bindings {
                let assigned: Vec<PortBinding> = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|binding| {
                        let host_port = binding.host_port.clone().unwrap_or_else(|| {
                            state.next_port += 1;
                            state.next_port.to_string()
                        });
                        PortBinding {
                            host_ip: binding.host_ip,
                            host_port: Some(host_port),
                        }
                    })
                    .collect();
                ports.insert(port, Some(assigned));
            }
        }

        state.containers.push(ContainerInspectResponse {
            id: Some(id.clone()),
            name: Some(format!("/{name}")),
            state: Some(ContainerState {
                running: Some(false),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: config.image.clone(),
                env: config.env.clone(),
                cmd: config.cmd.clone(),
                labels: config.labels.clone(),
                ..Default::default()
            }),
            host_config: config.host_config.clone(),
            network_settings: Some(NetworkSettings {
                networks: Some(networks),
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        });

        Ok(ContainerCreateResponse {
            id,
            warnings: vec![],
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        let mut state = self.begin(Op::Start, Call::Start(id.to_string()))?;
        let index = find(&state, id).ok_or_else(|| not_found(id))?;
        let container = &mut state.containers[index];
        if is_running(container) {
            return Err(server_error(304, "container already started"));
        }
        set_running(container, true);
        Ok(())
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), DockerError> {
        let mut state = self.begin(Op::Stop, Call::Stop(id.to_string(), grace))?;
        let index = find(&state, id).ok_or_else(|| not_found(id))?;
        if !is_running(&state.containers[index]) {
            return Err(server_error(304, "container already stopped"));
        }
        if auto_removes(&state.containers[index]) {
            state.containers.remove(index);
        } else {
            set_running(&mut state.containers[index], false);
        }
        Ok(())
    }

    async fn kill_container(&self, id: &str) -> Result<(), DockerError> {
        let mut state = self.begin(Op::Kill, Call::Kill(id.to_string()))?;
        let index = find(&state, id).ok_or_else(|| not_found(id))?;
        if !is_running(&state.containers[index]) {
            return Err(server_error(409, "container is not running"));
        }
        if auto_removes(&state.containers[index]) {
            state.containers.remove(index);
        } else {
            set_running(&mut state.containers[index], false);
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        let mut state = self.begin(Op::Remove, Call::Remove(id.to_string()))?;
        let index = find(&state, id).ok_or_else(|| not_found(id))?;
        state.containers.remove(index);
        Ok(())
    }

    async fn upload_archive(&self, id: &str, path: &str, archive: Bytes) -> Result<(), DockerError> {
        let mut state = self.begin(
            Op::Upload,
            Call::Upload {
                container: id.to_string(),
                path: path.to_string(),
            },
        )?;
        find(&state, id).ok_or_else(|| not_found(id))?;
        state.uploads.push(archive);
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> Result<(), DockerError> {
        let mut state = self.begin(
            Op::Connect,
            Call::Connect {
                network: network.to_string(),
                container: container.to_string(),
                endpoint: endpoint.clone(),
            },
        )?;
        let (network_id, network_name) = resolve_network(&state, network);
        let index = find(&state, container).ok_or_else(|| not_found(container))?;
        let settings = state.containers[index]
            .network_settings
            .get_or_insert_with(Default::default);
        let mut endpoint = endpoint;
        endpoint.network_id.get_or_insert(network_id);
        settings
            .networks
            .get_or_insert_with(Default::default)
            .insert(network_name, endpoint);
        Ok(())
    }

    async fn disconnect_network(&self, network: &str, container: &str) -> Result<(), DockerError> {
        let mut state = self.begin(
            Op::Disconnect,
            Call::Disconnect {
                network: network.to_string(),
                container: container.to_string(),
            },
        )?;
        let (network_id, _) = resolve_network(&state, network);
        let index = find(&state, container).ok_or_else(|| not_found(container))?;
        let networks = state.containers[index]
            .network_settings
            .as_mut()
            .and_then(|s| s.networks.as_mut());
        let removed = networks.and_then(|networks| {
            let key = networks
                .iter()
                .find(|(_, e)| e.network_id.as_deref() == Some(network_id.as_str()))
                .map(|(k, _)| k.clone())?;
            networks.remove(&key)
        });
        match removed {
            Some(_) => Ok(()),
            None => Err(server_error(
                403,
                &format!("container {container} is not connected to network {network}"),
            )),
        }
    }

    async fn list_networks(&self, filters: Filters) -> Result<Vec<Network>, DockerError> {
        let state = self.begin(Op::ListNetworks, Call::ListNetworks(filters.clone()))?;
        let builtin_only = filters
            .get("type")
            .is_some_and(|v| v.iter().any(|t| t == "builtin"));
        Ok(state
            .networks
            .iter()
            .filter(|n| !builtin_only || n.builtin)
            .map(|n| Network {
                id: Some(n.id.clone()),
                name: Some(n.name.clone()),
                driver: Some("bridge".to_string()),
                ipam: Some(Ipam {
                    config: Some(
                        n.gateway
                            .iter()
                            .map(|g| IpamConfig {
                                gateway: Some(g.clone()),
                                ..Default::default()
                            })
                            .collect(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .collect())
    }

    async fn list_containers(
        &self,
        all: bool,
        filters: Filters,
    ) -> Result<Vec<ContainerSummary>, DockerError> {
        let state = self.begin(Op::ListContainers, Call::ListContainers(filters.clone()))?;
        let labels = filters.get("label").cloned().unwrap_or_default();
        Ok(state
            .containers
            .iter()
            .filter(|c| all || is_running(c))
            .filter(|c| labels.iter().all(|l| matches_label(c, l)))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: c.name.clone().map(|n| vec![n]),
                labels: c.config.as_ref().and_then(|cfg| cfg.labels.clone()),
                ..Default::default()
            })
            .collect())
    }

    async fn inspect_image(&self, image: &str) -> Result<ImageInspect, DockerError> {
        let state = self.begin(Op::InspectImage, Call::InspectImage(image.to_string()))?;
        if state.images.contains(image) {
            Ok(ImageInspect {
                id: Some(format!("sha256:{image}")),
                ..Default::default()
            })
        } else {
            Err(server_error(404, &format!("No such image: {image}")))
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let mut state = self.begin(Op::Pull, Call::Pull(image.to_string()))?;
        state.images.insert(image.to_string());
        Ok(())
    }
}
