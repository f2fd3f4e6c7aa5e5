//! container-intercept - Main entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use container_intercept::{
    cli::{Cli, Command, run_intercept_command, run_tunnel_command},
    config::Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = match cli.log.as_deref() {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("container_intercept=info")),
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    // Loads .env as well
    let config = Config::from_env()?;

    match cli.command {
        Command::Intercept(args) => run_intercept_command(args, &config).await,
        Command::Tunnel(cmd) => run_tunnel_command(cmd, &config).await,
    }
}
