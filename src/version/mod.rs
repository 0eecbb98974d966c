//! Master-version registry
//!
//! Maps a master-version identifier to the template files needed to build
//! that version's control-plane workloads. The registry is immutable for
//! the lifetime of the process; a missing lookup is terminal for the
//! requesting cluster.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::template::parse_yaml;
use crate::{Error, Result};

/// One supported control-plane version and its deployment templates
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterVersion {
    /// Version identifier as referenced by cluster specs
    pub id: String,
    /// Template for the etcd-operator deployment
    pub etcd_operator_deployment_yaml: String,
    /// Template for the apiserver deployment
    pub apiserver_deployment_yaml: String,
    /// Template for the controller-manager deployment
    pub controller_deployment_yaml: String,
    /// Template for the scheduler deployment
    pub scheduler_deployment_yaml: String,
    /// Template for the etcd cluster manifest
    pub etcd_cluster_yaml: String,
}

/// Immutable map of supported master versions
#[derive(Clone, Debug, Default)]
pub struct VersionRegistry {
    versions: HashMap<String, Arc<MasterVersion>>,
}

impl VersionRegistry {
    /// Build a registry from a list of versions.
    pub fn new(versions: impl IntoIterator<Item = MasterVersion>) -> Self {
        Self {
            versions: versions
                .into_iter()
                .map(|v| (v.id.clone(), Arc::new(v)))
                .collect(),
        }
    }

    /// Load a registry from a `versions.yaml` file: a YAML list of
    /// [`MasterVersion`] entries.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::template(path.display().to_string(), e.to_string()))?;
        let value = parse_yaml(&raw)
            .map_err(|e| Error::template(path.display().to_string(), e.to_string()))?;
        let versions: Vec<MasterVersion> = serde_json::from_value(value)
            .map_err(|e| Error::serialization_for_kind("MasterVersion", e.to_string()))?;
        Ok(Self::new(versions))
    }

    /// Look up a version by id.
    pub fn get(&self, id: &str) -> Option<Arc<MasterVersion>> {
        self.versions.get(id).cloned()
    }

    /// Number of registered versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// True when no versions are registered.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_version(id: &str) -> MasterVersion {
    MasterVersion {
        id: id.to_string(),
        etcd_operator_deployment_yaml: "etcd-operator-dep.yaml".to_string(),
        apiserver_deployment_yaml: "apiserver-dep.yaml".to_string(),
        controller_deployment_yaml: "controller-manager-dep.yaml".to_string(),
        scheduler_deployment_yaml: "scheduler-dep.yaml".to_string(),
        etcd_cluster_yaml: "etcd-cluster.yaml".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn lookup_hits_and_misses() {
        let registry = VersionRegistry::new([test_version("1.9.0"), test_version("1.10.0")]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("1.9.0").unwrap().id, "1.9.0");
        assert!(registry.get("zzz").is_none());
    }

    #[test]
    fn loads_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
- id: "1.9.0"
  etcdOperatorDeploymentYaml: etcd-operator-dep.yaml
  apiserverDeploymentYaml: apiserver-dep.yaml
  controllerDeploymentYaml: controller-manager-dep.yaml
  schedulerDeploymentYaml: scheduler-dep.yaml
  etcdClusterYaml: etcd-cluster.yaml
"#
        )
        .unwrap();

        let registry = VersionRegistry::from_yaml_file(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
        let v = registry.get("1.9.0").unwrap();
        assert_eq!(v.apiserver_deployment_yaml, "apiserver-dep.yaml");
        assert_eq!(v.etcd_cluster_yaml, "etcd-cluster.yaml");
    }

    #[test]
    fn malformed_registry_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "- id: [not, a, string]").unwrap();
        assert!(VersionRegistry::from_yaml_file(file.path()).is_err());
    }
}
