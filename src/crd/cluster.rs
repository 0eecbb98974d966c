//! TenantCluster Custom Resource Definition
//!
//! A TenantCluster describes one tenant control plane hosted inside the
//! seed cluster. The record is created by the external API layer; phase
//! reconcilers are the only writers after that.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{CloudSpec, ClusterAddress, ClusterPhase, RootCa};

/// Specification for a TenantCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "mantle.dev",
    version = "v1alpha1",
    kind = "TenantCluster",
    plural = "tenantclusters",
    shortname = "tc",
    status = "TenantClusterStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.masterVersion"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.address.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantClusterSpec {
    /// Desired control-plane version id; empty means the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_version: Option<String>,

    /// Cloud provider settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudSpec>,
}

/// Status for a TenantCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantClusterStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: ClusterPhase,

    /// When the phase last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    /// Root certificate authority; absent until minted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_ca: Option<RootCa>,

    /// Public apiserver SSH key material; absent or empty means the
    /// `apiserver-ssh` secret must be (re-)minted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apiserver_ssh: Option<String>,

    /// Public address of the tenant apiserver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<ClusterAddress>,
}

impl TenantCluster {
    /// The cluster's stable name.
    ///
    /// Creation through the API layer guarantees a name; a record without
    /// one never reaches the reconciler.
    pub fn cluster_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Current phase, defaulting to Pending for a status-less record.
    pub fn phase(&self) -> ClusterPhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    /// True once the root CA keypair has been minted.
    pub fn has_root_ca(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.root_ca.as_ref())
            .is_some_and(|ca| !ca.key.is_empty())
    }

    /// True when the `apiserver-ssh` secret must be deleted and re-created.
    pub fn needs_ssh_remint(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.apiserver_ssh.as_deref())
            .map(str::is_empty)
            .unwrap_or(true)
    }

    /// Mutable status, created on first touch.
    pub fn status_mut(&mut self) -> &mut TenantClusterStatus {
        self.status.get_or_insert_with(TenantClusterStatus::default)
    }

    /// Mutable address block, created on first touch.
    pub fn address_mut(&mut self) -> &mut ClusterAddress {
        self.status_mut()
            .address
            .get_or_insert_with(ClusterAddress::default)
    }

    /// Move the cluster to a new phase, stamping the transition time.
    pub fn transition(&mut self, phase: ClusterPhase, now: DateTime<Utc>) {
        let status = self.status_mut();
        status.phase = phase;
        status.last_transition_time = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn sample(name: &str) -> TenantCluster {
        TenantCluster {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: TenantClusterSpec::default(),
            status: None,
        }
    }

    #[test]
    fn statusless_record_is_pending() {
        let c = sample("c1");
        assert_eq!(c.phase(), ClusterPhase::Pending);
        assert!(!c.has_root_ca());
    }

    #[test]
    fn empty_ssh_material_requests_remint() {
        let mut c = sample("c1");
        assert!(c.needs_ssh_remint());

        c.status_mut().apiserver_ssh = Some(String::new());
        assert!(c.needs_ssh_remint());

        c.status_mut().apiserver_ssh = Some("ssh-material".to_string());
        assert!(!c.needs_ssh_remint());
    }

    #[test]
    fn transition_stamps_the_time() {
        let mut c = sample("c1");
        let now = Utc::now();
        c.transition(ClusterPhase::Launching, now);
        let status = c.status.as_ref().unwrap();
        assert_eq!(status.phase, ClusterPhase::Launching);
        assert_eq!(status.last_transition_time, Some(now));
    }

    #[test]
    fn status_serializes_in_camel_case() {
        let mut c = sample("c1");
        c.address_mut().apiserver_external_port = 30000;
        let json = serde_json::to_value(c.status.as_ref().unwrap()).unwrap();
        assert_eq!(json["address"]["apiserverExternalPort"], 30000);
        assert_eq!(json["phase"], "Pending");
    }
}
