//! Pending-phase timeout predicate
//!
//! Consulted before any pipeline work. Expiry aborts the reconcile; acting
//! on the stuck cluster (alerting, failing it over) belongs to the outer
//! control loop, not the pipeline.

use chrono::Utc;

#[cfg(test)]
use mockall::automock;

use crate::crd::TenantCluster;
use crate::{Error, Result};

/// Bounds how long a cluster may sit in its current phase.
#[cfg_attr(test, automock)]
pub trait TimeoutPolicy: Send + Sync {
    /// Ok when the cluster may continue; `Error::Timeout` once expired.
    fn check(&self, cluster: &TenantCluster) -> Result<()>;
}

/// Wall-clock timeout measured from the last phase transition.
///
/// Falls back to the record's creation timestamp for clusters that have
/// never transitioned; a record with neither timestamp never times out.
pub struct WallClockTimeout {
    budget: chrono::Duration,
}

impl WallClockTimeout {
    /// Create a policy with the given phase budget.
    pub fn new(budget: std::time::Duration) -> Self {
        Self {
            budget: chrono::Duration::from_std(budget).unwrap_or(chrono::Duration::MAX),
        }
    }
}

impl TimeoutPolicy for WallClockTimeout {
    fn check(&self, cluster: &TenantCluster) -> Result<()> {
        let since = cluster
            .status
            .as_ref()
            .and_then(|s| s.last_transition_time)
            .or_else(|| cluster.metadata.creation_timestamp.as_ref().map(|t| t.0));

        let Some(since) = since else {
            return Ok(());
        };

        if Utc::now() - since > self.budget {
            return Err(Error::Timeout {
                cluster: cluster.cluster_name().to_string(),
                phase: cluster.phase().as_event_tag().to_string(),
            });
        }
        Ok(())
    }
}
