//! Artifact generators for control-plane objects
//!
//! Pure functions that, given a cluster record and the template loader,
//! produce fully-populated host-cluster objects. Generators never talk to
//! the API; the step executors own probing and creation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::ObjectMeta;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

use crate::config::ControllerConfig;
use crate::crd::{EtcdCluster, TenantCluster};
use crate::pki::SshKeyPair;
use crate::template::TemplateLoader;
use crate::version::MasterVersion;
use crate::{namespace_name, Error, Result};

/// Length of the minted admin bearer token
const ADMIN_TOKEN_LEN: usize = 32;

/// Template context shared by every template-driven generator.
///
/// Exposes the cluster identity and address plus the datacenter settings;
/// individual generators extend it with their own keys.
pub fn base_context(cluster: &TenantCluster, config: &ControllerConfig) -> Value {
    let address = cluster.status.as_ref().and_then(|s| s.address.as_ref());
    json!({
        "cluster": {
            "name": cluster.cluster_name(),
            "namespace": namespace_name(cluster.cluster_name()),
            "url": address.map(|a| a.url.clone()).unwrap_or_default(),
            "external_port": address.map(|a| a.apiserver_external_port).unwrap_or_default(),
            "admin_token": address.map(|a| a.admin_token.clone()).unwrap_or_default(),
        },
        "dc": config.dc,
        "external_url": config.external_url,
    })
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(base_map), Value::Object(extra_map)) = (base.as_object_mut(), extra) {
        base_map.extend(extra_map);
    }
    base
}

/// Load `<app>-service.yaml` for the cluster.
pub fn load_service_file(
    loader: &TemplateLoader,
    cluster: &TenantCluster,
    config: &ControllerConfig,
    app: &str,
) -> Result<Service> {
    loader.load(&format!("{app}-service.yaml"), &base_context(cluster, config))
}

/// Load `<app>-serviceaccount.yaml`.
pub fn load_service_account_file(loader: &TemplateLoader, app: &str) -> Result<ServiceAccount> {
    loader.load(&format!("{app}-serviceaccount.yaml"), &json!({ "app": app }))
}

/// Load `<app>-rolebinding.yaml`, binding subjects inside the cluster's
/// namespace. The binding itself is cluster-scoped, so its name embeds the
/// namespace to stay unique across tenants.
pub fn load_cluster_role_binding_file(
    loader: &TemplateLoader,
    namespace: &str,
    app: &str,
) -> Result<ClusterRoleBinding> {
    loader.load(
        &format!("{app}-rolebinding.yaml"),
        &json!({ "app": app, "namespace": namespace }),
    )
}

/// Load a deployment template named by the version registry.
pub fn load_deployment_file(
    loader: &TemplateLoader,
    cluster: &TenantCluster,
    config: &ControllerConfig,
    version: &MasterVersion,
    yaml_file: &str,
) -> Result<Deployment> {
    let ctx = merge(
        base_context(cluster, config),
        json!({ "version": { "id": version.id } }),
    );
    loader.load(yaml_file, &ctx)
}

/// Load the etcd cluster manifest named by the version registry.
pub fn load_etcd_cluster_file(
    loader: &TemplateLoader,
    version: &MasterVersion,
    yaml_file: &str,
) -> Result<EtcdCluster> {
    loader.load(yaml_file, &json!({ "version": { "id": version.id } }))
}

/// Build the `aws-cloud-config` config map from the cluster's AWS spec.
pub fn aws_cloud_config_config_map(cluster: &TenantCluster) -> Result<ConfigMap> {
    let aws = cluster
        .spec
        .cloud
        .as_ref()
        .and_then(|c| c.aws.as_ref())
        .ok_or_else(|| {
            Error::generation("cm", "aws-cloud-config", "cluster has no AWS cloud spec")
        })?;

    let cloud_config = format!(
        "[global]\nzone = {}\nvpc = {}\nsubnet-id = {}\ndisable-security-group-ingress = true\n",
        aws.availability_zone, aws.vpc_id, aws.subnet_id,
    );

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some("aws-cloud-config".to_string()),
            ..Default::default()
        },
        data: Some([("cloud.conf".to_string(), cloud_config)].into()),
        ..Default::default()
    })
}

/// Mint the `token-users` secret and the admin bearer token it contains.
///
/// The token is recorded on the cluster's address block by the caller so it
/// survives the yield.
pub fn token_users_secret() -> (Secret, String) {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ADMIN_TOKEN_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();

    let tokens_csv = format!("{token},admin,admin,system:masters\n");
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some("token-users".to_string()),
            ..Default::default()
        },
        string_data: Some([("tokens.csv".to_string(), tokens_csv)].into()),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    (secret, token)
}

/// Load the `apiserver-auth` secret carrying the root CA material.
pub fn apiserver_auth_secret(
    loader: &TemplateLoader,
    cluster: &TenantCluster,
    config: &ControllerConfig,
) -> Result<Secret> {
    let ca = cluster
        .status
        .as_ref()
        .and_then(|s| s.root_ca.as_ref())
        .ok_or_else(|| {
            Error::generation("secret", "apiserver-auth", "root CA not minted yet")
        })?;

    let ctx = merge(
        base_context(cluster, config),
        json!({
            "ca_cert_b64": BASE64.encode(ca.cert.as_bytes()),
            "ca_key_b64": BASE64.encode(ca.key.as_bytes()),
        }),
    );
    loader.load("apiserver-auth-secret.yaml", &ctx)
}

/// Load the `apiserver-ssh` secret with a freshly minted keypair.
///
/// Returns the keypair so the caller can record the public half on the
/// cluster status.
pub fn apiserver_ssh_secret(
    loader: &TemplateLoader,
    cluster: &TenantCluster,
    config: &ControllerConfig,
) -> Result<(Secret, SshKeyPair)> {
    let pair = SshKeyPair::generate()?;
    let ctx = merge(
        base_context(cluster, config),
        json!({
            "ssh_private_key_b64": BASE64.encode(pair.private_key_pem.as_bytes()),
            "ssh_public_key_b64": BASE64.encode(pair.public_key_pem.as_bytes()),
        }),
    );
    let secret = loader.load("apiserver-ssh-secret.yaml", &ctx)?;
    Ok((secret, pair))
}

/// Fixture templates shared by unit tests across modules.
#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::Path;

    /// Write the full default template set into `dir`.
    pub fn write_default_templates(dir: &Path) {
        let files: &[(&str, &str)] = &[
            (
                "apiserver-service.yaml",
                r#"
apiVersion: v1
kind: Service
metadata:
  name: apiserver
  labels:
    role: apiserver
spec:
  type: NodePort
  selector:
    role: apiserver
  ports:
    - name: secure
      port: 443
      targetPort: 443
      nodePort: {{ cluster.external_port }}
      protocol: TCP
"#,
            ),
            (
                "apiserver-insecure-service.yaml",
                r#"
apiVersion: v1
kind: Service
metadata:
  name: apiserver-insecure
  labels:
    role: apiserver
spec:
  selector:
    role: apiserver
  ports:
    - name: insecure
      port: 8080
      targetPort: 8080
      protocol: TCP
"#,
            ),
            (
                "etcd-operator-serviceaccount.yaml",
                r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: {{ app }}
"#,
            ),
            (
                "etcd-operator-rolebinding.yaml",
                r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: {{ app }}-{{ namespace }}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: {{ app }}
subjects:
  - kind: ServiceAccount
    name: {{ app }}
    namespace: {{ namespace }}
"#,
            ),
            (
                "apiserver-auth-secret.yaml",
                r#"
apiVersion: v1
kind: Secret
metadata:
  name: apiserver-auth
type: Opaque
data:
  root-ca.crt: {{ ca_cert_b64 }}
  root-ca.key: {{ ca_key_b64 }}
"#,
            ),
            (
                "apiserver-ssh-secret.yaml",
                r#"
apiVersion: v1
kind: Secret
metadata:
  name: apiserver-ssh
type: Opaque
data:
  id_rsa: {{ ssh_private_key_b64 }}
  id_rsa.pub: {{ ssh_public_key_b64 }}
"#,
            ),
            (
                "etcd-cluster.yaml",
                r#"
apiVersion: etcd.database.coreos.com/v1beta2
kind: EtcdCluster
metadata:
  name: etcd-cluster
spec:
  size: 3
  version: "3.2.7"
"#,
            ),
        ];

        for (name, content) in files {
            std::fs::write(dir.join(name), content).unwrap();
        }

        for role in ["etcd-operator", "apiserver", "controller-manager", "scheduler"] {
            let dep = format!(
                r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {role}
  labels:
    role: {role}
spec:
  replicas: 1
  selector:
    matchLabels:
      role: {role}
  template:
    metadata:
      labels:
        role: {role}
    spec:
      containers:
        - name: {role}
          image: registry.example.com/{role}:v{{{{ version.id }}}}
"#
            );
            std::fs::write(dir.join(format!("{role}-dep.yaml")), dep).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{AwsCloudSpec, CloudSpec, RootCa, TenantClusterSpec};
    use crate::version::test_version;

    fn cluster(name: &str) -> TenantCluster {
        TenantCluster {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: TenantClusterSpec::default(),
            status: None,
        }
    }

    fn harness() -> (tempfile::TempDir, TemplateLoader, ControllerConfig) {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write_default_templates(dir.path());
        let loader = TemplateLoader::new(dir.path());
        let config = ControllerConfig::for_tests(dir.path().to_path_buf());
        (dir, loader, config)
    }

    #[test]
    fn public_service_takes_the_allocated_node_port() {
        let (_dir, loader, config) = harness();
        let mut c = cluster("c1");
        c.address_mut().apiserver_external_port = 30007;

        let svc = load_service_file(&loader, &c, &config, "apiserver").unwrap();
        assert_eq!(svc.metadata.name.as_deref(), Some("apiserver"));
        let ports = svc.spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].node_port, Some(30007));
    }

    #[test]
    fn insecure_service_has_no_node_port() {
        let (_dir, loader, config) = harness();
        let svc =
            load_service_file(&loader, &cluster("c1"), &config, "apiserver-insecure").unwrap();
        let ports = svc.spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].node_port, None);
    }

    #[test]
    fn role_binding_name_embeds_the_namespace() {
        let (_dir, loader, _config) = harness();
        let binding =
            load_cluster_role_binding_file(&loader, "cluster-c1", "etcd-operator").unwrap();
        assert_eq!(
            binding.metadata.name.as_deref(),
            Some("etcd-operator-cluster-c1")
        );
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.namespace.as_deref(), Some("cluster-c1"));
    }

    #[test]
    fn deployment_selector_carries_the_role_label() {
        let (_dir, loader, config) = harness();
        let version = test_version("1.9.0");
        let dep = load_deployment_file(
            &loader,
            &cluster("c1"),
            &config,
            &version,
            &version.apiserver_deployment_yaml,
        )
        .unwrap();
        let labels = dep.spec.unwrap().selector.match_labels.unwrap();
        assert_eq!(labels.get("role").map(String::as_str), Some("apiserver"));
    }

    #[test]
    fn deployment_image_is_versioned() {
        let (_dir, loader, config) = harness();
        let version = test_version("1.9.0");
        let dep = load_deployment_file(
            &loader,
            &cluster("c1"),
            &config,
            &version,
            &version.scheduler_deployment_yaml,
        )
        .unwrap();
        let image = dep.spec.unwrap().template.spec.unwrap().containers[0]
            .image
            .clone()
            .unwrap();
        assert!(image.ends_with(":v1.9.0"));
    }

    #[test]
    fn etcd_cluster_manifest_names_the_object() {
        let (_dir, loader, _config) = harness();
        let version = test_version("1.9.0");
        let etcd =
            load_etcd_cluster_file(&loader, &version, &version.etcd_cluster_yaml).unwrap();
        assert_eq!(etcd.metadata.name.as_deref(), Some("etcd-cluster"));
        assert_eq!(etcd.spec.size, 3);
    }

    #[test]
    fn aws_cloud_config_requires_the_aws_spec() {
        let err = aws_cloud_config_config_map(&cluster("c1")).unwrap_err();
        assert!(matches!(err, Error::Generation { .. }));
    }

    #[test]
    fn aws_cloud_config_renders_the_ini() {
        let mut c = cluster("c1");
        c.spec.cloud = Some(CloudSpec {
            aws: Some(AwsCloudSpec {
                access_key_id: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                vpc_id: "vpc-1".to_string(),
                subnet_id: "subnet-1".to_string(),
                availability_zone: "eu-central-1a".to_string(),
            }),
        });

        let cm = aws_cloud_config_config_map(&c).unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("aws-cloud-config"));
        let conf = cm.data.unwrap().remove("cloud.conf").unwrap();
        assert!(conf.contains("zone = eu-central-1a"));
        assert!(conf.contains("vpc = vpc-1"));
        assert!(conf.contains("subnet-id = subnet-1"));
    }

    #[test]
    fn token_users_secret_grants_system_masters() {
        let (secret, token) = token_users_secret();
        assert_eq!(secret.metadata.name.as_deref(), Some("token-users"));
        assert_eq!(token.len(), ADMIN_TOKEN_LEN);
        assert_eq!(token, token.to_lowercase());

        let csv = secret
            .string_data
            .unwrap()
            .remove("tokens.csv")
            .unwrap();
        assert_eq!(csv, format!("{token},admin,admin,system:masters\n"));
    }

    #[test]
    fn token_users_tokens_are_unique() {
        let (_, a) = token_users_secret();
        let (_, b) = token_users_secret();
        assert_ne!(a, b);
    }

    #[test]
    fn apiserver_auth_needs_a_minted_ca() {
        let (_dir, loader, config) = harness();
        let err = apiserver_auth_secret(&loader, &cluster("c1"), &config).unwrap_err();
        assert!(err.to_string().contains("root CA not minted"));
    }

    #[test]
    fn apiserver_auth_carries_the_ca_material() {
        let (_dir, loader, config) = harness();
        let mut c = cluster("c1");
        c.status_mut().root_ca = Some(RootCa {
            cert: "CERT-PEM".to_string(),
            key: "KEY-PEM".to_string(),
        });

        let secret = apiserver_auth_secret(&loader, &c, &config).unwrap();
        let data = secret.data.unwrap();
        assert_eq!(data["root-ca.crt"].0, b"CERT-PEM");
        assert_eq!(data["root-ca.key"].0, b"KEY-PEM");
    }

    #[test]
    fn apiserver_ssh_secret_matches_the_returned_pair() {
        let (_dir, loader, config) = harness();
        let (secret, pair) = apiserver_ssh_secret(&loader, &cluster("c1"), &config).unwrap();
        let data = secret.data.unwrap();
        assert_eq!(data["id_rsa"].0, pair.private_key_pem.as_bytes());
        assert_eq!(data["id_rsa.pub"].0, pair.public_key_pem.as_bytes());
    }
}
