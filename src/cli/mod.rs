//! CLI command handling.
//!
//! Provides subcommands for:
//! - Intercepting a single container in place (`intercept`)
//! - Managing tunnel containers (`tunnel start`, `tunnel networks`,
//!   `tunnel port`, `tunnel stop`)

mod intercept;
mod tunnel;

pub use intercept::{InterceptArgs, run_intercept_command};
pub use tunnel::{TunnelCommand, run_tunnel_command};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "container-intercept")]
#[command(about = "Redirect container HTTP(S) traffic through a local proxy")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter directive (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recreate a running container with proxy settings injected
    Intercept(InterceptArgs),

    /// Manage SOCKS tunnel containers
    #[command(subcommand)]
    Tunnel(TunnelCommand),
}
