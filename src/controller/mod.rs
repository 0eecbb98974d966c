//! TenantCluster controller
//!
//! The controller-runtime guarantees at most one in-flight reconcile per
//! cluster key; that single-flight discipline is what makes the pending
//! pipeline's yield-persist-resume cycle safe. This module dispatches a
//! record to its phase handler and persists whatever the handler hands
//! back.

mod context;
mod pending;
pub mod timeout;

pub use context::{PendingContext, SeedStores};
pub use pending::{sync_pending_cluster, SyncOutcome};

use std::sync::Arc;
use std::time::Duration;

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{ClusterPhase, TenantCluster};
use crate::{Error, Result};

/// Context shared across all reconcile calls.
pub struct RunContext {
    /// Collaborators of the pending pipeline
    pub pending: PendingContext,
    /// Client used to persist reconcile outcomes
    pub client: Client,
}

/// Reconcile one TenantCluster.
///
/// Only the Pending phase is owned here; later phases belong to their own
/// reconcilers and are left untouched.
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<TenantCluster>, ctx: Arc<RunContext>) -> Result<Action> {
    match cluster.phase() {
        ClusterPhase::Pending => match sync_pending_cluster(&ctx.pending, &cluster).await? {
            SyncOutcome::Yielded(c) => {
                debug!("pipeline yielded, persisting mutated record");
                persist(&ctx.client, &c).await?;
                // The persisted mutation re-triggers the watch; the short
                // requeue only covers a missed event.
                Ok(Action::requeue(Duration::from_secs(5)))
            }
            SyncOutcome::Launched(c) => {
                info!("cluster launched");
                persist(&ctx.client, &c).await?;
                Ok(Action::await_change())
            }
            SyncOutcome::Failed { cluster: c, error } => {
                error!(error = %error, "cluster failed terminally");
                persist(&ctx.client, &c).await?;
                Ok(Action::await_change())
            }
        },
        ClusterPhase::Launching | ClusterPhase::Running => {
            // Owned by the launching/running reconcilers.
            Ok(Action::await_change())
        }
        ClusterPhase::Failed => {
            debug!("cluster is Failed, awaiting spec change");
            Ok(Action::await_change())
        }
    }
}

/// Persist a mutated cluster record: spec first (version pinning), then the
/// status subresource.
async fn persist(client: &Client, cluster: &TenantCluster) -> Result<()> {
    let api: Api<TenantCluster> = Api::all(client.clone());
    let name = cluster.cluster_name();
    let pp = PatchParams::default();

    api.patch(name, &pp, &Patch::Merge(&json!({ "spec": &cluster.spec })))
        .await?;
    if let Some(status) = &cluster.status {
        api.patch_status(name, &pp, &Patch::Merge(&json!({ "status": status })))
            .await?;
    }
    Ok(())
}

/// Requeue strategy when reconciliation fails.
pub fn error_policy(cluster: Arc<TenantCluster>, error: &Error, _ctx: Arc<RunContext>) -> Action {
    if error.is_retryable() {
        warn!(cluster = %cluster.name_any(), error = %error, "reconcile failed, requeueing");
        Action::requeue(Duration::from_secs(15))
    } else {
        error!(cluster = %cluster.name_any(), error = %error, "reconcile failed terminally");
        Action::await_change()
    }
}
