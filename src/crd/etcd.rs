//! EtcdCluster custom resource
//!
//! Mirrors the etcd-operator resource: the reconciler only ever creates
//! these from a version's manifest template and probes for their presence;
//! the etcd-operator deployment does the actual work.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification of an etcd cluster managed by the etcd-operator
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "etcd.database.coreos.com",
    version = "v1beta2",
    kind = "EtcdCluster",
    plural = "etcdclusters",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EtcdClusterSpec {
    /// Number of etcd members
    pub size: i32,

    /// Etcd version to run
    pub version: String,

    /// Pause reconciliation of this etcd cluster
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
}

impl Default for EtcdCluster {
    fn default() -> Self {
        Self::new("", EtcdClusterSpec::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_a_manifest() {
        let manifest = serde_json::json!({
            "apiVersion": "etcd.database.coreos.com/v1beta2",
            "kind": "EtcdCluster",
            "metadata": { "name": "etcd-cluster" },
            "spec": { "size": 3, "version": "3.2.7" }
        });
        let etcd: EtcdCluster = serde_json::from_value(manifest).unwrap();
        assert_eq!(etcd.metadata.name.as_deref(), Some("etcd-cluster"));
        assert_eq!(etcd.spec.size, 3);
        assert!(!etcd.spec.paused);
    }
}
