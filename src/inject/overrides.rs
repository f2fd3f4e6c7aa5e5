//! Override environment generation.
//!
//! The replacer does not know which variables a particular runtime needs to
//! trust the proxy; it asks an [`OverrideEnv`] implementation for them and
//! appends the result after the container's original env.

use crate::engine::Platform;
use crate::env::EnvMap;

/// Where the replaced container will find the proxy and injected files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideContext {
    /// Address of the host as seen from inside the container.
    pub host_address: String,
    /// In-container directory holding the override files.
    pub overrides_path: String,
    pub platform: Platform,
}

/// Computes the env entries that redirect a container through the proxy.
pub trait OverrideEnv: Send + Sync {
    fn override_env(
        &self,
        proxy_port: u16,
        certificate_path: &str,
        current_env: &EnvMap,
        context: &OverrideContext,
    ) -> Vec<String>;
}

impl<F> OverrideEnv for F
where
    F: Fn(u16, &str, &EnvMap, &OverrideContext) -> Vec<String> + Send + Sync,
{
    fn override_env(
        &self,
        proxy_port: u16,
        certificate_path: &str,
        current_env: &EnvMap,
        context: &OverrideContext,
    ) -> Vec<String> {
        self(proxy_port, certificate_path, current_env, context)
    }
}

/// Standard proxy and CA variables understood by most HTTP clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyEnvOverrides;

const PROXY_VARS: &[&str] = &["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"];

const CA_VARS: &[&str] = &["SSL_CERT_FILE", "NODE_EXTRA_CA_CERTS", "REQUESTS_CA_BUNDLE"];

impl OverrideEnv for ProxyEnvOverrides {
    fn override_env(
        &self,
        proxy_port: u16,
        certificate_path: &str,
        _current_env: &EnvMap,
        context: &OverrideContext,
    ) -> Vec<String> {
        let proxy_url = format!("http://{}:{}", context.host_address, proxy_port);
        PROXY_VARS
            .iter()
            .map(|key| format!("{key}={proxy_url}"))
            .chain(CA_VARS.iter().map(|key| format!("{key}={certificate_path}")))
            .collect()
    }
}
