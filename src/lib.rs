//! Mantle - operator that materializes tenant Kubernetes control planes
//! inside a host ("seed") cluster.
//!
//! A `TenantCluster` record declares a desired control plane. Phase
//! reconcilers drive the record through its lifecycle; this crate implements
//! the *Pending* reconciler, which mints the cluster's root CA, reserves a
//! stable external apiserver endpoint, and provisions every control-plane
//! side effect in the host cluster (secrets, services, service accounts,
//! cluster role bindings, config maps, deployments, the etcd cluster
//! resource, and the default add-ons) before promoting the record to
//! *Launching*.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (TenantCluster, EtcdCluster, ClusterAddon)
//! - [`controller`] - the pending-phase reconciliation pipeline
//! - [`cache`] - read-only local mirrors of host-cluster objects
//! - [`client`] - write access to the host cluster, one writer per kind
//! - [`resources`] - artifact generators for control-plane objects
//! - [`template`] - on-disk YAML template rendering
//! - [`version`] - master-version registry
//! - [`pki`] - root CA and SSH key minting
//! - [`ports`] - NodePort allocation
//! - [`events`] - cluster event recording
//! - [`error`] - error types for the operator

pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod pki;
pub mod ports;
pub mod resources;
pub mod template;
pub mod version;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller name reported on Kubernetes Events and used as field manager.
pub const CONTROLLER_NAME: &str = "mantle-cluster-controller";

/// Namespace in the host cluster holding a tenant cluster's control plane.
///
/// Every namespaced resource the reconciler creates lives here.
pub fn namespace_name(cluster_name: &str) -> String {
    format!("cluster-{cluster_name}")
}

/// Namespace holding a tenant cluster's add-on resources.
///
/// Coincides with [`namespace_name`] today; kept separate so the add-on
/// plane can move without touching the control-plane call sites.
pub fn addon_namespace(cluster_name: &str) -> String {
    format!("cluster-{cluster_name}")
}

/// Public apiserver URL for a tenant cluster.
pub fn cluster_url(cluster_name: &str, dc: &str, external_url: &str, port: i32) -> String {
    format!("https://{cluster_name}.{dc}.{external_url}:{port}")
}

/// Common name of a tenant cluster's root certificate authority.
pub fn ca_common_name(cluster_name: &str, dc: &str, external_url: &str) -> String {
    format!("root-ca.{cluster_name}.{dc}.{external_url}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_derived_from_cluster_name() {
        assert_eq!(namespace_name("c1"), "cluster-c1");
        assert_eq!(addon_namespace("c1"), "cluster-c1");
    }

    #[test]
    fn url_and_cn_follow_the_naming_scheme() {
        assert_eq!(
            cluster_url("c1", "eu-central-1", "example.com", 30000),
            "https://c1.eu-central-1.example.com:30000"
        );
        assert_eq!(
            ca_common_name("c1", "eu-central-1", "example.com"),
            "root-ca.c1.eu-central-1.example.com"
        );
    }
}
