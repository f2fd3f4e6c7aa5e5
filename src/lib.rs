//! Transparent HTTP(S) interception for running containers.
//!
//! Two mechanisms:
//! - [`inject`] recreates a running container in place with proxy settings,
//!   a trusted CA certificate, and override files.
//! - [`tunnel`] keeps one SOCKS tunnel container per proxy attached to every
//!   network that has an intercepted container.
//!
//! Both talk to the daemon through [`engine::ContainerEngine`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod inject;
pub mod tunnel;

pub use error::{ConfigError, InterceptError, Result};
