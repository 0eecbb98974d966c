//! Custom Resource Definitions
//!
//! - [`TenantCluster`] - the cluster record this operator reconciles
//! - [`EtcdCluster`] - the etcd-operator custom resource describing the
//!   control plane's etcd
//! - [`ClusterAddon`] - an optional in-cluster component installed into the
//!   tenant cluster later

mod addon;
mod cluster;
mod etcd;
mod types;

pub use addon::{default_addons, AddonPhase, ClusterAddon, ClusterAddonSpec};
pub use cluster::{TenantCluster, TenantClusterSpec, TenantClusterStatus};
pub use etcd::{EtcdCluster, EtcdClusterSpec};
pub use types::{AwsCloudSpec, CloudSpec, ClusterAddress, ClusterPhase, RootCa};
