//! Cluster event recording
//!
//! Every side-effecting action in the pipeline emits a human-readable event
//! on the TenantCluster, tagged with the phase that performed it. Recording
//! is fire-and-forget: failures are logged as warnings and never propagate.
//! A failed event must never break reconciliation.

use async_trait::async_trait;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use crate::crd::TenantCluster;
use crate::CONTROLLER_NAME;

/// Trait for recording progress events on a cluster record.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterEventRecorder: Send + Sync {
    /// Record an event tagged with the given phase name (e.g. "pending").
    async fn record(&self, cluster: &TenantCluster, phase: &str, note: String);
}

/// Production recorder wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    /// Create a recorder reporting as the mantle controller.
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl ClusterEventRecorder for KubeEventRecorder {
    async fn record(&self, cluster: &TenantCluster, phase: &str, note: String) {
        let event = Event {
            type_: EventType::Normal,
            reason: phase.to_string(),
            note: Some(note),
            action: "Provision".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &cluster.object_ref(&())).await {
            warn!(phase, error = %e, "failed to publish cluster event");
        }
    }
}

/// No-op recorder for tests: all calls are silently ignored.
pub struct NoopRecorder;

#[async_trait]
impl ClusterEventRecorder for NoopRecorder {
    async fn record(&self, _cluster: &TenantCluster, _phase: &str, _note: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TenantClusterSpec;
    use kube::api::ObjectMeta;

    #[test]
    fn noop_recorder_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopRecorder>();
    }

    #[tokio::test]
    async fn noop_recorder_does_not_panic() {
        let cluster = TenantCluster {
            metadata: ObjectMeta {
                name: Some("c1".to_string()),
                ..Default::default()
            },
            spec: TenantClusterSpec::default(),
            status: None,
        };
        NoopRecorder
            .record(&cluster, "pending", "Created secret \"x\"".to_string())
            .await;
    }
}
