//! `intercept` command: recreate one container with interception enabled.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::config::Config;
use crate::engine::BollardEngine;
use crate::inject::{InjectionMode, InterceptionConfig, ProxyEnvOverrides, restart_and_inject};

#[derive(Args, Debug, Clone)]
pub struct InterceptArgs {
    /// Container id or name to intercept
    pub container: String,

    /// Port of the local HTTP proxy
    #[arg(long)]
    pub proxy_port: u16,

    /// Path of the proxy CA certificate (PEM)
    #[arg(long)]
    pub cert: PathBuf,

    /// Directory of override files (defaults to INTERCEPT_OVERRIDES_DIR)
    #[arg(long)]
    pub overrides: Option<PathBuf>,

    /// How override files reach the container: mount or inject
    #[arg(long)]
    pub mode: Option<InjectionMode>,
}

impl InterceptArgs {
    /// Merge flags over the configured defaults.
    pub fn interception_config(
        &self,
        config: &Config,
        certificate_content: String,
    ) -> InterceptionConfig {
        let mut interception = InterceptionConfig::new(
            self.mode.unwrap_or(config.injection.mode),
            self.proxy_port,
            certificate_content,
            self.cert.clone(),
            self.overrides
                .clone()
                .unwrap_or_else(|| config.injection.overrides_dir.clone()),
        );
        interception.stop_grace = config.injection.stop_grace;
        interception
    }
}

/// Run the intercept command, printing the new container id.
pub async fn run_intercept_command(args: InterceptArgs, config: &Config) -> anyhow::Result<()> {
    let certificate = tokio::fs::read_to_string(&args.cert)
        .await
        .with_context(|| format!("failed to read certificate {}", args.cert.display()))?;
    let interception = args.interception_config(config, certificate);

    let engine = BollardEngine::connect()
        .await
        .context("failed to connect to Docker")?;

    let new_id = restart_and_inject(&engine, &args.container, &interception, &ProxyEnvOverrides)
        .await
        .with_context(|| format!("failed to intercept container {}", args.container))?;

    println!("{new_id}");
    Ok(())
}
