//! Pending-phase pipeline
//!
//! Drives a freshly-declared cluster record from Pending to Launching by
//! materializing its control plane in the host cluster, one idempotent step
//! at a time. The pipeline is resumable: whenever a step mutates the
//! cluster record (CA minted, port assigned, token or SSH material
//! recorded) it yields immediately so the mutation is durably persisted
//! before later steps can depend on it. The next reconcile re-enters,
//! observes the persisted state, skips completed steps, and continues.

use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::ResourceExt;
use tracing::{debug, instrument, warn};

use crate::cache::ObjectCache;
use crate::client::ObjectWriter;
use crate::controller::context::PendingContext;
use crate::crd::{
    default_addons, AddonPhase, ClusterAddon, ClusterAddonSpec, ClusterPhase, TenantCluster,
};
use crate::version::MasterVersion;
use crate::{addon_namespace, ca_common_name, cluster_url, namespace_name, pki, ports, resources};
use crate::{Error, Result};

/// Outcome of one pending-phase reconcile.
///
/// Exactly one of three things happens per call; transient errors surface
/// as `Err` and are retried by the controller runtime.
#[derive(Debug)]
pub enum SyncOutcome {
    /// A step mutated the cluster record. Persist it, then reconcile again.
    Yielded(TenantCluster),
    /// Every step completed; the record now carries phase Launching.
    Launched(TenantCluster),
    /// Domain-terminal failure; the returned record already carries phase
    /// Failed. Persist it and stop retrying until the spec changes.
    Failed {
        /// The failed cluster record
        cluster: TenantCluster,
        /// What went wrong
        error: Error,
    },
}

/// How a step's cache key is formed.
enum KeyScope {
    /// Probe by `<namespace>/<name>` before generating.
    Namespaced,
    /// Generate first, probe by the object's own (cluster-wide) name.
    ClusterWide,
}

/// An artifact plus whether producing it mutated the cluster record.
struct Generated<K> {
    object: K,
    cluster_changed: bool,
}

impl<K> Generated<K> {
    fn unchanged(object: K) -> Self {
        Self {
            object,
            cluster_changed: false,
        }
    }
}

type Generator<K> = fn(&PendingContext, &mut TenantCluster) -> Result<Generated<K>>;

/// One ensure-style resource step: probe, optionally delete, generate,
/// create, record.
struct ResourceStep<K: 'static> {
    /// Object name within the cluster namespace (ignored for cluster-wide
    /// objects, whose generated name is authoritative)
    name: &'static str,
    scope: KeyScope,
    /// Delete the cached object and create it anew
    recreate: bool,
    generate: Generator<K>,
}

/// Reconcile a cluster in the Pending phase.
///
/// Step order encodes the topological dependency between control-plane
/// resources: CA before anything that embeds it, the public endpoint before
/// anything that advertises it, workloads last.
#[instrument(skip(ctx, cluster), fields(cluster = %cluster.cluster_name()))]
pub async fn sync_pending_cluster(
    ctx: &PendingContext,
    cluster: &TenantCluster,
) -> Result<SyncOutcome> {
    ctx.timeout.check(cluster)?;

    let mut c = cluster.clone();

    if ensure_root_ca(ctx, &mut c)? {
        return Ok(SyncOutcome::Yielded(c));
    }

    // The token-users secret mints the admin token; persist immediately so
    // the token recorded on the address block survives.
    if ensure_token_users(ctx, &mut c).await? {
        return Ok(SyncOutcome::Yielded(c));
    }

    // Create the public apiserver service early so the cluster has valid
    // contact information for everything generated after it.
    if ensure_apiserver_public_service(ctx, &mut c).await? {
        return Ok(SyncOutcome::Yielded(c));
    }

    ensure_service_accounts(ctx, &mut c).await?;
    ensure_cluster_role_bindings(ctx, &mut c).await?;
    ensure_services(ctx, &mut c).await?;

    if ensure_secrets(ctx, &mut c).await? {
        return Ok(SyncOutcome::Yielded(c));
    }

    ensure_config_maps(ctx, &mut c).await?;
    ensure_pvcs(ctx, &mut c).await?;

    if let Err(e) = ensure_deployments(ctx, &mut c).await {
        return terminal_or_transient(c, e);
    }
    if let Err(e) = ensure_etcd_cluster(ctx, &mut c).await {
        return terminal_or_transient(c, e);
    }

    ensure_default_addons(ctx, &c).await?;

    c.transition(ClusterPhase::Launching, Utc::now());
    Ok(SyncOutcome::Launched(c))
}

/// Route an error from the version-resolving steps: unknown-version is
/// terminal (the record already carries phase Failed), anything else retries.
fn terminal_or_transient(cluster: TenantCluster, error: Error) -> Result<SyncOutcome> {
    if matches!(error, Error::UnknownMasterVersion { .. }) {
        Ok(SyncOutcome::Failed { cluster, error })
    } else {
        Err(error)
    }
}

/// Run a table of ensure steps against one resource kind.
///
/// Returns `Ok(true)` as soon as a generator mutates the cluster record
/// (the pipeline yields), `Ok(false)` when the whole table ran without
/// mutation.
async fn ensure_objects<K>(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
    kind: &'static str,
    phase_tag: &'static str,
    cache: &dyn ObjectCache<K>,
    writer: &dyn ObjectWriter<K>,
    steps: &[ResourceStep<K>],
) -> Result<bool>
where
    K: kube::Resource + Send + Sync + 'static,
{
    let ns = namespace_name(cluster.cluster_name());
    for step in steps {
        match step.scope {
            KeyScope::Namespaced => {
                let key = format!("{ns}/{}", step.name);
                if cache.get_by_key(&key)?.is_some() {
                    if !step.recreate {
                        debug!(%key, kind, "skipping existing object");
                        continue;
                    }
                    writer.delete(Some(&ns), step.name).await?;
                }

                let generated = (step.generate)(ctx, cluster)?;
                writer.create(Some(&ns), &generated.object).await?;
                ctx.recorder
                    .record(cluster, phase_tag, format!("Created {kind} {key:?}"))
                    .await;

                if generated.cluster_changed {
                    return Ok(true);
                }
            }
            KeyScope::ClusterWide => {
                let generated = (step.generate)(ctx, cluster)?;
                let name = generated.object.name_any();
                if cache.get_by_key(&name)?.is_some() {
                    debug!(%name, kind, "skipping existing object");
                    continue;
                }

                writer.create(None, &generated.object).await?;
                ctx.recorder
                    .record(cluster, phase_tag, format!("Created {kind} {name:?}"))
                    .await;

                if generated.cluster_changed {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn ensure_root_ca(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<bool> {
    if cluster.has_root_ca() {
        return Ok(false);
    }

    let cn = ca_common_name(
        cluster.cluster_name(),
        &ctx.config.dc,
        &ctx.config.external_url,
    );
    let ca = pki::mint_root_ca(&cn)?;
    cluster.status_mut().root_ca = Some(ca);
    Ok(true)
}

async fn ensure_token_users(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<bool> {
    let ns = namespace_name(cluster.cluster_name());
    let key = format!("{ns}/token-users");
    if ctx.secrets.get_by_key(&key)?.is_some() {
        debug!(%key, "skipping existing secret");
        return Ok(false);
    }

    let (secret, token) = resources::token_users_secret();
    ctx.secret_writer.create(Some(&ns), &secret).await?;
    ctx.recorder
        .record(cluster, "launching", format!("Created secret {key:?}"))
        .await;

    cluster.address_mut().admin_token = token;
    Ok(true)
}

async fn ensure_apiserver_public_service(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<bool> {
    let ns = namespace_name(cluster.cluster_name());
    let key = format!("{ns}/apiserver");
    if ctx.services.get_by_key(&key)?.is_some() {
        return Ok(false);
    }

    let port = ports::free_node_port(
        ctx.service_lister.as_ref(),
        ctx.config.min_apiserver_port,
        ctx.config.max_apiserver_port,
    )?;
    let url = cluster_url(
        cluster.cluster_name(),
        &ctx.config.dc,
        &ctx.config.external_url,
        port,
    );
    let address = cluster.address_mut();
    address.apiserver_external_port = port;
    address.url = url;

    let service = resources::load_service_file(&ctx.templates, cluster, &ctx.config, "apiserver")
        .map_err(|e| Error::generation("apiserver service", &key, e.to_string()))?;
    ctx.service_writer.create(Some(&ns), &service).await?;
    ctx.recorder
        .record(
            cluster,
            "launching",
            format!("Created apiserver service {key:?}"),
        )
        .await;

    Ok(true)
}

async fn ensure_service_accounts(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<()> {
    let steps = [ResourceStep::<ServiceAccount> {
        name: "etcd-operator",
        scope: KeyScope::Namespaced,
        recreate: false,
        generate: gen_etcd_operator_service_account,
    }];
    ensure_objects(
        ctx,
        cluster,
        "service account",
        "launching",
        ctx.service_accounts.as_ref(),
        ctx.service_account_writer.as_ref(),
        &steps,
    )
    .await
    .map(|_| ())
}

async fn ensure_cluster_role_bindings(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<()> {
    let steps = [ResourceStep::<ClusterRoleBinding> {
        name: "etcd-operator",
        scope: KeyScope::ClusterWide,
        recreate: false,
        generate: gen_etcd_operator_role_binding,
    }];
    ensure_objects(
        ctx,
        cluster,
        "binding",
        "launching",
        ctx.cluster_role_bindings.as_ref(),
        ctx.cluster_role_binding_writer.as_ref(),
        &steps,
    )
    .await
    .map(|_| ())
}

async fn ensure_services(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<()> {
    let steps = [ResourceStep {
        name: "apiserver-insecure",
        scope: KeyScope::Namespaced,
        recreate: false,
        generate: gen_apiserver_insecure_service,
    }];
    ensure_objects(
        ctx,
        cluster,
        "service",
        "launching",
        ctx.services.as_ref(),
        ctx.service_writer.as_ref(),
        &steps,
    )
    .await
    .map(|_| ())
}

async fn ensure_secrets(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<bool> {
    let steps = [
        ResourceStep {
            name: "apiserver-auth",
            scope: KeyScope::Namespaced,
            recreate: false,
            generate: gen_apiserver_auth_secret,
        },
        ResourceStep {
            name: "apiserver-ssh",
            scope: KeyScope::Namespaced,
            // Empty SSH material on the status means the secret in the host
            // cluster no longer matches the record: delete and re-mint.
            recreate: cluster.needs_ssh_remint(),
            generate: gen_apiserver_ssh_secret,
        },
    ];
    ensure_objects(
        ctx,
        cluster,
        "secret",
        "pending",
        ctx.secrets.as_ref(),
        ctx.secret_writer.as_ref(),
        &steps,
    )
    .await
}

async fn ensure_config_maps(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<()> {
    let mut steps: Vec<ResourceStep<ConfigMap>> = Vec::new();
    if cluster
        .spec
        .cloud
        .as_ref()
        .and_then(|c| c.aws.as_ref())
        .is_some()
    {
        steps.push(ResourceStep {
            name: "aws-cloud-config",
            scope: KeyScope::Namespaced,
            recreate: false,
            generate: gen_aws_cloud_config,
        });
    }
    ensure_objects(
        ctx,
        cluster,
        "cm",
        "launching",
        ctx.config_maps.as_ref(),
        ctx.config_map_writer.as_ref(),
        &steps,
    )
    .await
    .map(|_| ())
}

async fn ensure_pvcs(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<()> {
    // No claims today: the etcd-operator provisions etcd's storage itself.
    // The step stays so storage for future components slots into the
    // pipeline in dependency order.
    let steps: [ResourceStep<PersistentVolumeClaim>; 0] = [];
    ensure_objects(
        ctx,
        cluster,
        "pvc",
        "launching",
        ctx.pvcs.as_ref(),
        ctx.pvc_writer.as_ref(),
        &steps,
    )
    .await
    .map(|_| ())
}

/// Resolve the cluster's master version against the registry, substituting
/// the configured default for a blank spec.
///
/// An unknown version is terminal: the record is moved to Failed here and
/// the returned error carries the unresolvable id.
async fn resolve_master_version(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<Arc<MasterVersion>> {
    if cluster
        .spec
        .master_version
        .as_deref()
        .map_or(true, str::is_empty)
    {
        cluster.spec.master_version = Some(ctx.config.default_master_version.clone());
    }
    let id = cluster.spec.master_version.clone().unwrap_or_default();

    if let Some(version) = ctx.versions.get(&id) {
        return Ok(version);
    }

    cluster.transition(ClusterPhase::Failed, Utc::now());
    warn!(cluster = %cluster.cluster_name(), version = %id, "unknown master version");
    ctx.recorder
        .record(
            cluster,
            "launching",
            format!(
                "Failed to create new cluster {:?} due to unknown master version {:?}",
                cluster.cluster_name(),
                id
            ),
        )
        .await;
    Err(Error::UnknownMasterVersion {
        cluster: cluster.cluster_name().to_string(),
        version: id,
    })
}

async fn ensure_deployments(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<()> {
    let version = resolve_master_version(ctx, cluster).await?;
    let ns = namespace_name(cluster.cluster_name());

    let deps = [
        ("etcd-operator", &version.etcd_operator_deployment_yaml),
        ("apiserver", &version.apiserver_deployment_yaml),
        ("controller-manager", &version.controller_deployment_yaml),
        ("scheduler", &version.scheduler_deployment_yaml),
    ];

    // Deployments are probed by their `role` selector label, not by name:
    // template authors own the object names, the pipeline owns the roles.
    let existing = ctx.deployments.by_namespace(&ns)?;
    for (role, yaml_file) in deps {
        let exists = existing.iter().any(|d| {
            d.spec
                .as_ref()
                .and_then(|s| s.selector.match_labels.as_ref())
                .and_then(|l| l.get("role"))
                .is_some_and(|r| r == role)
        });
        if exists {
            debug!(role, cluster = %cluster.cluster_name(), "skipping existing dep");
            continue;
        }

        let dep =
            resources::load_deployment_file(&ctx.templates, cluster, &ctx.config, &version, yaml_file)
                .map_err(|e| Error::generation("deployment", role, e.to_string()))?;
        ctx.deployment_writer.create(Some(&ns), &dep).await?;
        ctx.recorder
            .record(cluster, "launching", format!("Created dep {role:?}"))
            .await;
    }

    Ok(())
}

async fn ensure_etcd_cluster(ctx: &PendingContext, cluster: &mut TenantCluster) -> Result<()> {
    let version = resolve_master_version(ctx, cluster).await?;
    let ns = namespace_name(cluster.cluster_name());

    // The template decides the object name, so load before probing.
    let etcd =
        resources::load_etcd_cluster_file(&ctx.templates, &version, &version.etcd_cluster_yaml)
            .map_err(|e| {
                Error::generation("etcd-cluster", &version.etcd_cluster_yaml, e.to_string())
            })?;
    let name = etcd.name_any();

    let key = format!("{ns}/{name}");
    if ctx.etcd_clusters.get_by_key(&key)?.is_some() {
        debug!(cluster = %cluster.cluster_name(), "skipping existing etcd-cluster");
        return Ok(());
    }

    ctx.etcd_cluster_writer.create(Some(&ns), &etcd).await?;
    ctx.recorder
        .record(cluster, "launching", format!("Created etcd-cluster {name:?}"))
        .await;
    Ok(())
}

async fn ensure_default_addons(ctx: &PendingContext, cluster: &TenantCluster) -> Result<()> {
    let ns = addon_namespace(cluster.cluster_name());
    for (safe_name, addon_name) in default_addons() {
        let meta_name = format!("addon-default-{safe_name}");
        let key = format!("{ns}/{meta_name}");
        if ctx.addons.get_by_key(&key)?.is_some() {
            debug!(%meta_name, "skipping existing default addon");
            continue;
        }

        let addon = ClusterAddon::new(
            &meta_name,
            ClusterAddonSpec {
                name: (*addon_name).to_string(),
                phase: AddonPhase::Pending,
            },
        );
        ctx.addon_writer.create(Some(&ns), &addon).await?;
    }
    Ok(())
}

// Generators for the table-driven steps. Each produces a fully-populated
// object; only the SSH generator writes back into the cluster record.

fn gen_etcd_operator_service_account(
    ctx: &PendingContext,
    _cluster: &mut TenantCluster,
) -> Result<Generated<ServiceAccount>> {
    resources::load_service_account_file(&ctx.templates, "etcd-operator")
        .map_err(|e| Error::generation("service account", "etcd-operator", e.to_string()))
        .map(Generated::unchanged)
}

fn gen_etcd_operator_role_binding(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<Generated<ClusterRoleBinding>> {
    let ns = namespace_name(cluster.cluster_name());
    resources::load_cluster_role_binding_file(&ctx.templates, &ns, "etcd-operator")
        .map_err(|e| Error::generation("cluster role binding", "etcd-operator", e.to_string()))
        .map(Generated::unchanged)
}

fn gen_apiserver_insecure_service(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<Generated<k8s_openapi::api::core::v1::Service>> {
    resources::load_service_file(&ctx.templates, cluster, &ctx.config, "apiserver-insecure")
        .map_err(|e| Error::generation("service", "apiserver-insecure", e.to_string()))
        .map(Generated::unchanged)
}

fn gen_apiserver_auth_secret(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<Generated<Secret>> {
    resources::apiserver_auth_secret(&ctx.templates, cluster, &ctx.config)
        .map(Generated::unchanged)
}

fn gen_apiserver_ssh_secret(
    ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<Generated<Secret>> {
    let (secret, pair) = resources::apiserver_ssh_secret(&ctx.templates, cluster, &ctx.config)
        .map_err(|e| Error::generation("secret", "apiserver-ssh", e.to_string()))?;
    cluster.status_mut().apiserver_ssh = Some(pair.public_key_pem);
    Ok(Generated {
        object: secret,
        cluster_changed: true,
    })
}

fn gen_aws_cloud_config(
    _ctx: &PendingContext,
    cluster: &mut TenantCluster,
) -> Result<Generated<ConfigMap>> {
    resources::aws_cloud_config_config_map(cluster).map(Generated::unchanged)
}
