//! Operator configuration

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the cluster controller.
///
/// Everything here is static for the lifetime of the process; the version
/// registry is carried separately so it can be reloaded in the future.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Root directory for the on-disk resource templates
    pub master_resources_path: PathBuf,
    /// Datacenter identifier; appears in the CA common name and public URL
    pub dc: String,
    /// External DNS suffix; appears in the CA common name and public URL
    pub external_url: String,
    /// Lower bound (inclusive) for apiserver NodePort allocation
    pub min_apiserver_port: i32,
    /// Upper bound (inclusive) for apiserver NodePort allocation
    pub max_apiserver_port: i32,
    /// Master version substituted when the cluster spec leaves it blank
    pub default_master_version: String,
    /// How long a cluster may remain in Pending before it is given up on
    pub pending_timeout: Duration,
}

impl ControllerConfig {
    /// Default NodePort range, matching the kubelet's default service range.
    pub const DEFAULT_PORT_RANGE: (i32, i32) = (30000, 32767);

    /// Default time a cluster may spend in Pending.
    pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(30 * 60);
}

#[cfg(test)]
impl ControllerConfig {
    /// A config suitable for unit tests: tiny port range, temp paths.
    pub fn for_tests(master_resources_path: PathBuf) -> Self {
        Self {
            master_resources_path,
            dc: "eu-central-1".to_string(),
            external_url: "example.com".to_string(),
            min_apiserver_port: 30000,
            max_apiserver_port: 30010,
            default_master_version: "1.9.0".to_string(),
            pending_timeout: Self::DEFAULT_PENDING_TIMEOUT,
        }
    }
}
