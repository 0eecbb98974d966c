//! Mantle operator binary
//!
//! Watches TenantCluster records and runs the phase reconcilers against the
//! host cluster. Reflector stores mirror every resource kind the pending
//! pipeline probes, so reconciliation never performs remote reads.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::runtime::reflector::{self, Store};
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, CustomResourceExt};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mantle::config::ControllerConfig;
use mantle::controller::{error_policy, reconcile, PendingContext, RunContext, SeedStores};
use mantle::crd::{ClusterAddon, EtcdCluster, TenantCluster};
use mantle::version::VersionRegistry;

/// Mantle - materializes tenant Kubernetes control planes inside a host cluster
#[derive(Parser, Debug)]
#[command(name = "mantle", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Root directory for resource templates
    #[arg(long, default_value = "/etc/mantle/resources")]
    master_resources: PathBuf,

    /// Datacenter identifier (appears in CA common names and public URLs)
    #[arg(long)]
    dc: String,

    /// External DNS suffix (appears in CA common names and public URLs)
    #[arg(long)]
    external_url: String,

    /// Lower bound (inclusive) for apiserver NodePort allocation
    #[arg(long, default_value_t = ControllerConfig::DEFAULT_PORT_RANGE.0)]
    min_apiserver_port: i32,

    /// Upper bound (inclusive) for apiserver NodePort allocation
    #[arg(long, default_value_t = ControllerConfig::DEFAULT_PORT_RANGE.1)]
    max_apiserver_port: i32,

    /// Master version used when a cluster spec leaves it blank
    #[arg(long)]
    default_master_version: String,

    /// Path to the versions.yaml registry file
    #[arg(long)]
    versions_file: PathBuf,

    /// How long a cluster may remain Pending, in seconds
    #[arg(long, default_value_t = 1800)]
    pending_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        // kubectl accepts JSON manifests as-is.
        for crd in [
            TenantCluster::crd(),
            EtcdCluster::crd(),
            ClusterAddon::crd(),
        ] {
            println!("{}", serde_json::to_string_pretty(&crd)?);
        }
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ControllerConfig {
        master_resources_path: cli.master_resources,
        dc: cli.dc,
        external_url: cli.external_url,
        min_apiserver_port: cli.min_apiserver_port,
        max_apiserver_port: cli.max_apiserver_port,
        default_master_version: cli.default_master_version,
        pending_timeout: Duration::from_secs(cli.pending_timeout_secs),
    };
    let versions = VersionRegistry::from_yaml_file(&cli.versions_file)?;
    info!(
        versions = versions.len(),
        dc = %config.dc,
        "starting mantle controller"
    );

    let client = Client::try_default().await?;
    let stores = SeedStores {
        secrets: spawn_reflector::<Secret>(&client),
        services: spawn_reflector::<Service>(&client),
        service_accounts: spawn_reflector::<ServiceAccount>(&client),
        config_maps: spawn_reflector::<ConfigMap>(&client),
        pvcs: spawn_reflector::<PersistentVolumeClaim>(&client),
        cluster_role_bindings: spawn_reflector::<ClusterRoleBinding>(&client),
        deployments: spawn_reflector::<Deployment>(&client),
        etcd_clusters: spawn_reflector::<EtcdCluster>(&client),
        addons: spawn_reflector::<ClusterAddon>(&client),
    };

    let ctx = Arc::new(RunContext {
        pending: PendingContext::new(client.clone(), stores, config, versions),
        client: client.clone(),
    });

    let clusters: Api<TenantCluster> = Api::all(client);
    Controller::new(clusters, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(obj) => tracing::debug!(?obj, "reconciled cluster"),
                Err(e) => warn!(error = %e, "reconciliation error"),
            }
        })
        .await;

    info!("controller shut down");
    Ok(())
}

/// Start a cluster-wide reflector for one resource kind and return its
/// store reader. The driving task runs until the process exits.
fn spawn_reflector<K>(client: &Client) -> Store<K>
where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    let api: Api<K> = Api::all(client.clone());
    let (reader, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher(api, watcher::Config::default()));
    tokio::spawn(async move {
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            if let Err(e) = event {
                warn!(error = %e, "reflector stream error");
            }
        }
    });
    reader
}
