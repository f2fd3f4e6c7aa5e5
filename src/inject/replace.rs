//! Stop, remove, and recreate a container with interception settings.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use bollard::container::{Config, NetworkingConfig};
use bollard::models::{ContainerConfig, ContainerInspectResponse, EndpointSettings};
use futures::future::try_join_all;

use crate::engine::{self, ContainerEngine, Platform};
use crate::env;
use crate::error::Result;
use crate::inject::overrides::{OverrideContext, OverrideEnv};
use crate::inject::{INJECTED_CA_PATH, INJECTED_OVERRIDES_PATH, InjectionMode, pack_overrides};

/// Grace period for stopping the target. Replacement should feel instant.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);

/// Caller-supplied settings for one interception.
#[derive(Debug, Clone)]
pub struct InterceptionConfig {
    pub mode: InjectionMode,
    pub proxy_port: u16,
    /// PEM content of the proxy CA certificate.
    pub certificate_content: String,
    /// Host path of the certificate (bind-mounted in mount mode).
    pub certificate_path: PathBuf,
    /// Host directory of override files.
    pub overrides_dir: PathBuf,
    pub stop_grace: Duration,
    pub platform: Platform,
}

impl InterceptionConfig {
    pub fn new(
        mode: InjectionMode,
        proxy_port: u16,
        certificate_content: String,
        certificate_path: PathBuf,
        overrides_dir: PathBuf,
    ) -> Self {
        Self {
            mode,
            proxy_port,
            certificate_content,
            certificate_path,
            overrides_dir,
            stop_grace: DEFAULT_STOP_GRACE,
            platform: Platform::current(),
        }
    }
}

/// Everything needed to recreate a container from its snapshot.
#[derive(Debug, Clone)]
pub struct ReplacementSpec {
    pub name: String,
    /// Creation config. Carries at most one network.
    pub config: Config<String>,
    /// Networks to attach after creation, with their original endpoint settings.
    pub extra_networks: Vec<(String, EndpointSettings)>,
}

fn container_template(config: &ContainerConfig) -> Config<String> {
    let config = config.clone();
    Config {
        hostname: config.hostname,
        domainname: config.domainname,
        user: config.user,
        attach_stdin: config.attach_stdin,
        attach_stdout: config.attach_stdout,
        attach_stderr: config.attach_stderr,
        exposed_ports: config.exposed_ports,
        tty: config.tty,
        open_stdin: config.open_stdin,
        stdin_once: config.stdin_once,
        env: config.env,
        cmd: config.cmd,
        healthcheck: config.healthcheck,
        args_escaped: config.args_escaped,
        image: config.image,
        volumes: config.volumes,
        working_dir: config.working_dir,
        entrypoint: config.entrypoint,
        network_disabled: config.network_disabled,
        mac_address: config.mac_address,
        on_build: config.on_build,
        labels: config.labels,
        stop_signal: config.stop_signal,
        stop_timeout: config.stop_timeout,
        shell: config.shell,
        ..Default::default()
    }
}

/// Original networks in a stable order. The first one is attached at creation.
fn snapshot_networks(snapshot: &ContainerInspectResponse) -> Vec<(String, EndpointSettings)> {
    let mut networks: Vec<_> = snapshot
        .network_settings
        .as_ref()
        .and_then(|settings| settings.networks.clone())
        .unwrap_or_default()
        .into_iter()
        .collect();
    networks.sort_by(|a, b| a.0.cmp(&b.0));
    networks
}

/// Build the recreation spec from a snapshot without touching the snapshot.
///
/// `override_env` is appended after the original env so overrides win on
/// duplicate keys.
pub fn derive_replacement(
    snapshot: &ContainerInspectResponse,
    config: &InterceptionConfig,
    override_env: Vec<String>,
) -> ReplacementSpec {
    let mut container = snapshot
        .config
        .as_ref()
        .map(container_template)
        .unwrap_or_default();

    let mut env = container.env.take().unwrap_or_default();
    env.extend(override_env);
    container.env = Some(env);

    let mut host_config = snapshot.host_config.clone().unwrap_or_default();
    if config.mode == InjectionMode::Mount {
        let mut binds = host_config.binds.take().unwrap_or_default();
        binds.push(format!(
            "{}:{}:ro",
            config.certificate_path.display(),
            INJECTED_CA_PATH
        ));
        binds.push(format!(
            "{}:{}:ro",
            config.overrides_dir.display(),
            INJECTED_OVERRIDES_PATH
        ));
        host_config.binds = Some(binds);
    }
    container.host_config = Some(host_config);

    let mut networks = snapshot_networks(snapshot).into_iter();
    if let Some((name, endpoint)) = networks.next() {
        container.networking_config = Some(NetworkingConfig {
            endpoints_config: HashMap::from([(name, endpoint)]),
        });
    }

    ReplacementSpec {
        name: snapshot
            .name
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        config: container,
        extra_networks: networks.collect(),
    }
}

/// Recreate `container_id` so that it runs through the proxy.
///
/// Returns the id of the new container. Everything that can fail without
/// side effects (env parsing, host lookup, archive packing) runs before the
/// original container is stopped.
pub async fn restart_and_inject(
    engine: &dyn ContainerEngine,
    container_id: &str,
    config: &InterceptionConfig,
    overrides: &dyn OverrideEnv,
) -> Result<String> {
    let snapshot = engine.inspect_container(container_id).await?;
    let target = snapshot.id.clone().unwrap_or_else(|| container_id.to_string());

    let current_env = env::to_mapping(
        snapshot
            .config
            .as_ref()
            .and_then(|c| c.env.as_deref())
            .unwrap_or_default(),
    )?;
    let context = OverrideContext {
        host_address: engine::host_address(engine, config.platform).await?,
        overrides_path: INJECTED_OVERRIDES_PATH.to_string(),
        platform: config.platform,
    };
    let override_env =
        overrides.override_env(config.proxy_port, INJECTED_CA_PATH, &current_env, &context);
    let spec = derive_replacement(&snapshot, config, override_env);

    let archive = match config.mode {
        InjectionMode::Inject => Some(pack_overrides(
            &config.overrides_dir,
            &config.certificate_content,
        )?),
        InjectionMode::Mount => None,
    };

    engine.stop_container(&target, config.stop_grace).await?;

    match engine.remove_container(&target).await {
        Ok(()) => {}
        Err(e) if engine::is_already_gone(&e) => {
            tracing::debug!(container_id = %target, error = %e, "Container already removed");
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(
        container_id = %target,
        name = spec.name.as_str(),
        mode = %config.mode,
        "Removed original container, recreating with interception"
    );

    let new_id = match engine
        .create_container(&spec.name, spec.config.clone())
        .await
    {
        Ok(created) => created.id,
        Err(e) => {
            tracing::error!(
                name = spec.name.as_str(),
                image = spec.config.image.as_deref().unwrap_or(""),
                error = %e,
                "Failed to recreate container after removing the original"
            );
            return Err(e.into());
        }
    };

    match attach_and_start(engine, &new_id, &spec, archive).await {
        Ok(()) => {
            tracing::info!(
                container_id = %new_id,
                name = spec.name.as_str(),
                proxy_port = config.proxy_port,
                "Intercepted container started"
            );
            Ok(new_id)
        }
        Err(e) => {
            // The new container stays in the created state and holds the name.
            tracing::error!(
                container_id = %new_id,
                name = spec.name.as_str(),
                image = spec.config.image.as_deref().unwrap_or(""),
                error = %e,
                "Failed to start recreated container; remove it before retrying"
            );
            Err(e)
        }
    }
}

/// Connect the remaining networks, inject files if needed, then start.
async fn attach_and_start(
    engine: &dyn ContainerEngine,
    new_id: &str,
    spec: &ReplacementSpec,
    archive: Option<bytes::Bytes>,
) -> Result<()> {
    try_join_all(
        spec.extra_networks
            .iter()
            .map(|(network, endpoint)| engine.connect_network(network, new_id, endpoint.clone())),
    )
    .await?;

    if let Some(archive) = archive {
        engine.upload_archive(new_id, "/", archive).await?;
    }

    engine.start_container(new_id).await?;
    Ok(())
}
