//! Shared types used by the TenantCluster CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a tenant cluster
///
/// Transitions are strictly forward. The pending reconciler owns
/// `Pending -> Launching` and `Pending -> Failed`; later phases belong to
/// other reconcilers.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterPhase {
    /// Cluster record exists; control-plane resources not yet provisioned
    #[default]
    Pending,
    /// Control-plane resources are provisioned and coming up
    Launching,
    /// Control plane is serving
    Running,
    /// Cluster hit a terminal error (e.g. unknown master version)
    Failed,
}

impl ClusterPhase {
    /// Lowercase tag used on recorded events
    pub fn as_event_tag(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Launching => write!(f, "Launching"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Cloud provider section of the cluster spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpec {
    /// AWS settings; presence triggers cloud-config generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsCloudSpec>,
}

/// AWS-specific cloud settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsCloudSpec {
    /// Access key id used by the tenant control plane
    pub access_key_id: String,
    /// Secret access key used by the tenant control plane
    pub secret_access_key: String,
    /// VPC the tenant's nodes live in
    pub vpc_id: String,
    /// Subnet the tenant's nodes live in
    pub subnet_id: String,
    /// Availability zone of the tenant's nodes
    pub availability_zone: String,
}

/// Root certificate authority of a tenant cluster
///
/// Either both fields are set and form a self-consistent RSA-2048 CA
/// keypair, or the CA has not been minted yet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct RootCa {
    /// PEM-encoded self-signed CA certificate
    pub cert: String,
    /// PEM-encoded private key
    pub key: String,
}

/// Public address of the tenant apiserver
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAddress {
    /// `https://<name>.<dc>.<external-url>:<port>`; empty until the public
    /// service is created
    #[serde(default)]
    pub url: String,
    /// NodePort of the `apiserver` service; 0 until the port is chosen
    #[serde(default)]
    pub apiserver_external_port: i32,
    /// Bearer token minted together with the `token-users` secret
    #[serde(default)]
    pub admin_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_defaults_to_pending() {
        assert_eq!(ClusterPhase::default(), ClusterPhase::Pending);
    }

    #[test]
    fn phase_event_tags_are_lowercase() {
        assert_eq!(ClusterPhase::Pending.as_event_tag(), "pending");
        assert_eq!(ClusterPhase::Launching.as_event_tag(), "launching");
    }

    #[test]
    fn cloud_spec_roundtrips_with_aws() {
        let spec = CloudSpec {
            aws: Some(AwsCloudSpec {
                access_key_id: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                vpc_id: "vpc-1".to_string(),
                subnet_id: "subnet-1".to_string(),
                availability_zone: "eu-central-1a".to_string(),
            }),
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["aws"]["accessKeyId"], "AKIA");
        let back: CloudSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn address_fields_default_to_empty() {
        let addr: ClusterAddress = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(addr.url, "");
        assert_eq!(addr.apiserver_external_port, 0);
    }
}
