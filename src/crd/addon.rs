//! ClusterAddon custom resource
//!
//! An add-on describes an optional in-cluster component (CNI, DNS,
//! dashboard, ...) to be installed into the tenant cluster by the add-on
//! controller. The pending reconciler only seeds the default set; the phase
//! field rides on the spec because the legacy resource carried it on the
//! object body.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Installation phase of an add-on
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AddonPhase {
    /// Declared but not yet installed
    #[default]
    Pending,
    /// Installed into the tenant cluster
    Installed,
    /// Installation failed
    Failed,
}

/// Specification for a ClusterAddon
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "mantle.dev",
    version = "v1alpha1",
    kind = "ClusterAddon",
    plural = "clusteraddons",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAddonSpec {
    /// Add-on name as known to the add-on controller (e.g. "flannel-cni")
    pub name: String,

    /// Installation phase
    #[serde(default)]
    pub phase: AddonPhase,
}

impl Default for ClusterAddon {
    fn default() -> Self {
        Self::new("", ClusterAddonSpec::default())
    }
}

/// The default add-ons seeded into every new cluster.
///
/// Pairs of `(safe_name, addon_name)`: the safe name is embedded in the
/// object name (`addon-default-<safe-name>`), the addon name is what the
/// add-on controller resolves.
pub fn default_addons() -> &'static [(&'static str, &'static str)] {
    &[
        ("flannelcni", "flannel-cni"),
        ("heapster", "heapster"),
        ("kubedns", "kubedns"),
        ("kubeproxy", "kube-proxy"),
        ("kubernetesdashboard", "kubernetes-dashboard"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_covers_networking_dns_and_dashboard() {
        let addons = default_addons();
        assert_eq!(addons.len(), 5);
        assert!(addons.iter().any(|(_, n)| *n == "flannel-cni"));
        assert!(addons.iter().any(|(_, n)| *n == "kubedns"));
        assert!(addons.iter().any(|(_, n)| *n == "kubernetes-dashboard"));
        // Safe names must be usable inside an object name.
        for (safe, _) in addons {
            assert!(safe.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn addon_phase_defaults_to_pending() {
        let spec: ClusterAddonSpec =
            serde_json::from_value(serde_json::json!({ "name": "kubedns" })).unwrap();
        assert_eq!(spec.phase, AddonPhase::Pending);
    }
}
