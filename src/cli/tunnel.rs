//! `tunnel` commands: manage SOCKS tunnel containers.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;

use crate::config::Config;
use crate::engine::BollardEngine;
use crate::tunnel::{TunnelManager, TunnelScope};

#[derive(Subcommand, Debug, Clone)]
pub enum TunnelCommand {
    /// Start the tunnel for a proxy and print its local port
    Start {
        #[arg(long)]
        proxy_port: u16,
    },

    /// Attach the tunnel to exactly these networks (plus the default bridge)
    Networks {
        #[arg(long)]
        proxy_port: u16,

        /// Network ids to attach
        networks: Vec<String>,
    },

    /// Print the local port of a running tunnel
    Port {
        #[arg(long)]
        proxy_port: u16,
    },

    /// Kill and remove tunnels: a proxy port, or `all`
    Stop { scope: TunnelScope },
}

/// Run a tunnel command.
pub async fn run_tunnel_command(cmd: TunnelCommand, config: &Config) -> anyhow::Result<()> {
    let engine = BollardEngine::connect()
        .await
        .context("failed to connect to Docker")?;
    let manager = TunnelManager::new(Arc::new(engine), config.tunnel.clone());

    match cmd {
        TunnelCommand::Start { proxy_port } => {
            manager.prepare().await;
            manager.ensure_running(proxy_port).await?;
            println!("{}", manager.get_port(proxy_port).await?);
        }
        TunnelCommand::Networks {
            proxy_port,
            networks,
        } => {
            let desired: HashSet<String> = networks.into_iter().collect();
            let plan = manager.update_networks(proxy_port, &desired).await?;
            for network in &plan.connect {
                println!("+ {network}");
            }
            for network in &plan.disconnect {
                println!("- {network}");
            }
        }
        TunnelCommand::Port { proxy_port } => {
            println!("{}", manager.get_port(proxy_port).await?);
        }
        TunnelCommand::Stop { scope } => {
            let count = manager.stop_all(scope).await?;
            println!("Stopped {count} tunnel container(s)");
        }
    }

    Ok(())
}
