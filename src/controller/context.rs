//! Shared context for the pending-phase reconciler
//!
//! The context holds every outbound collaborator behind a trait object so
//! reconciliation logic can run against mocks in tests and against the kube
//! client in production.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::runtime::reflector::Store;
use kube::Client;

use crate::cache::{DeploymentIndex, ObjectCache, ReflectorCache, ServiceLister};
use crate::client::{ClusterWriter, NamespacedWriter, ObjectWriter};
use crate::config::ControllerConfig;
use crate::controller::timeout::{TimeoutPolicy, WallClockTimeout};
use crate::crd::{ClusterAddon, EtcdCluster};
use crate::events::{ClusterEventRecorder, KubeEventRecorder};
use crate::template::TemplateLoader;
use crate::version::VersionRegistry;

/// Reflector store readers over the host cluster, one per watched kind.
///
/// Populated by the watch machinery in `main`; the reconciler only ever
/// reads them.
pub struct SeedStores {
    /// Secrets mirror
    pub secrets: Store<Secret>,
    /// Services mirror
    pub services: Store<Service>,
    /// Service accounts mirror
    pub service_accounts: Store<ServiceAccount>,
    /// Config maps mirror
    pub config_maps: Store<ConfigMap>,
    /// Persistent volume claims mirror
    pub pvcs: Store<PersistentVolumeClaim>,
    /// Cluster role bindings mirror
    pub cluster_role_bindings: Store<ClusterRoleBinding>,
    /// Deployments mirror
    pub deployments: Store<Deployment>,
    /// Etcd cluster resources mirror
    pub etcd_clusters: Store<EtcdCluster>,
    /// Cluster add-ons mirror
    pub addons: Store<ClusterAddon>,
}

/// Everything the pending pipeline needs to reconcile one cluster.
pub struct PendingContext {
    /// Static operator configuration
    pub config: ControllerConfig,
    /// Supported master versions
    pub versions: VersionRegistry,
    /// Resource template loader rooted at the configured resources path
    pub templates: TemplateLoader,

    /// Secrets mirror
    pub secrets: Arc<dyn ObjectCache<Secret>>,
    /// Services mirror
    pub services: Arc<dyn ObjectCache<Service>>,
    /// Service enumeration for NodePort allocation
    pub service_lister: Arc<dyn ServiceLister>,
    /// Service accounts mirror
    pub service_accounts: Arc<dyn ObjectCache<ServiceAccount>>,
    /// Config maps mirror
    pub config_maps: Arc<dyn ObjectCache<ConfigMap>>,
    /// Persistent volume claims mirror
    pub pvcs: Arc<dyn ObjectCache<PersistentVolumeClaim>>,
    /// Cluster role bindings mirror (keyed by object name)
    pub cluster_role_bindings: Arc<dyn ObjectCache<ClusterRoleBinding>>,
    /// Namespace-indexed deployments mirror
    pub deployments: Arc<dyn DeploymentIndex>,
    /// Etcd cluster resources mirror
    pub etcd_clusters: Arc<dyn ObjectCache<EtcdCluster>>,
    /// Cluster add-ons mirror
    pub addons: Arc<dyn ObjectCache<ClusterAddon>>,

    /// Secret writer
    pub secret_writer: Arc<dyn ObjectWriter<Secret>>,
    /// Service writer
    pub service_writer: Arc<dyn ObjectWriter<Service>>,
    /// Service account writer
    pub service_account_writer: Arc<dyn ObjectWriter<ServiceAccount>>,
    /// Config map writer
    pub config_map_writer: Arc<dyn ObjectWriter<ConfigMap>>,
    /// Persistent volume claim writer
    pub pvc_writer: Arc<dyn ObjectWriter<PersistentVolumeClaim>>,
    /// Cluster role binding writer (cluster-wide)
    pub cluster_role_binding_writer: Arc<dyn ObjectWriter<ClusterRoleBinding>>,
    /// Deployment writer
    pub deployment_writer: Arc<dyn ObjectWriter<Deployment>>,
    /// Etcd cluster resource writer
    pub etcd_cluster_writer: Arc<dyn ObjectWriter<EtcdCluster>>,
    /// Cluster add-on writer
    pub addon_writer: Arc<dyn ObjectWriter<ClusterAddon>>,

    /// Progress event recorder
    pub recorder: Arc<dyn ClusterEventRecorder>,
    /// Pending-phase timeout predicate
    pub timeout: Arc<dyn TimeoutPolicy>,
}

impl PendingContext {
    /// Build the production context from a kube client and warm store readers.
    pub fn new(
        client: Client,
        stores: SeedStores,
        config: ControllerConfig,
        versions: VersionRegistry,
    ) -> Self {
        let templates = TemplateLoader::new(config.master_resources_path.clone());
        let timeout = Arc::new(WallClockTimeout::new(config.pending_timeout));
        let service_cache = Arc::new(ReflectorCache::new(stores.services));
        Self {
            templates,
            versions,
            secrets: Arc::new(ReflectorCache::new(stores.secrets)),
            services: service_cache.clone(),
            service_lister: service_cache,
            service_accounts: Arc::new(ReflectorCache::new(stores.service_accounts)),
            config_maps: Arc::new(ReflectorCache::new(stores.config_maps)),
            pvcs: Arc::new(ReflectorCache::new(stores.pvcs)),
            cluster_role_bindings: Arc::new(ReflectorCache::new(stores.cluster_role_bindings)),
            deployments: Arc::new(ReflectorCache::new(stores.deployments)),
            etcd_clusters: Arc::new(ReflectorCache::new(stores.etcd_clusters)),
            addons: Arc::new(ReflectorCache::new(stores.addons)),
            secret_writer: Arc::new(NamespacedWriter::new(client.clone(), "secret")),
            service_writer: Arc::new(NamespacedWriter::new(client.clone(), "service")),
            service_account_writer: Arc::new(NamespacedWriter::new(
                client.clone(),
                "service account",
            )),
            config_map_writer: Arc::new(NamespacedWriter::new(client.clone(), "cm")),
            pvc_writer: Arc::new(NamespacedWriter::new(client.clone(), "pvc")),
            cluster_role_binding_writer: Arc::new(ClusterWriter::new(
                client.clone(),
                "cluster role binding",
            )),
            deployment_writer: Arc::new(NamespacedWriter::new(client.clone(), "dep")),
            etcd_cluster_writer: Arc::new(NamespacedWriter::new(client.clone(), "etcd-cluster")),
            addon_writer: Arc::new(NamespacedWriter::new(client.clone(), "addon")),
            recorder: Arc::new(KubeEventRecorder::new(client)),
            timeout,
            config,
        }
    }
}
