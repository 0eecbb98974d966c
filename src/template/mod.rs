//! On-disk YAML template rendering
//!
//! Resource templates live as YAML files under the configured resources
//! root. A template is rendered with minijinja (strict: referencing an
//! undefined variable fails the render), parsed with yaml-rust2 into a
//! `serde_json::Value`, and finally deserialized into the typed object.

use std::path::{Path, PathBuf};

use minijinja::{Environment, UndefinedBehavior};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

/// Parse a YAML string into a `serde_json::Value`.
///
/// For multi-document YAML, returns only the first document. Returns
/// `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value> {
    let docs =
        YamlLoader::load_from_str(input).map_err(|e| Error::serialization(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| Error::serialization(e.to_string()))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    other => {
                        return Err(Error::serialization(format!(
                            "unsupported YAML key: {other:?}"
                        )))
                    }
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(Error::serialization("YAML aliases not supported")),
        Yaml::BadValue => Err(Error::serialization("bad YAML value")),
    }
}

/// Loads and renders resource templates from a directory.
pub struct TemplateLoader {
    root: PathBuf,
    env: Environment<'static>,
}

impl TemplateLoader {
    /// Create a loader rooted at the given resources directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self {
            root: root.into(),
            env,
        }
    }

    /// The resources root this loader reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render the named template file with the given context.
    pub fn render(&self, file: &str, ctx: &Value) -> Result<String> {
        let path = self.root.join(file);
        let source = std::fs::read_to_string(&path)
            .map_err(|e| Error::template(file, format!("read {}: {e}", path.display())))?;
        self.env
            .render_str(&source, ctx)
            .map_err(|e| Error::template(file, e.to_string()))
    }

    /// Render the named template and deserialize it into a typed object.
    pub fn load<K: DeserializeOwned>(&self, file: &str, ctx: &Value) -> Result<K> {
        let rendered = self.render(file, ctx)?;
        let value = parse_yaml(&rendered).map_err(|e| Error::template(file, e.to_string()))?;
        serde_json::from_value(value).map_err(|e| Error::template(file, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;

    fn loader_with(file: &str, content: &str) -> (tempfile::TempDir, TemplateLoader) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(file), content).unwrap();
        let loader = TemplateLoader::new(dir.path());
        (dir, loader)
    }

    #[test]
    fn renders_variables_into_yaml() {
        let (_dir, loader) = loader_with("svc.yaml", "name: {{ cluster.name }}\n");
        let ctx = serde_json::json!({ "cluster": { "name": "c1" } });
        assert_eq!(loader.render("svc.yaml", &ctx).unwrap(), "name: c1\n");
    }

    #[test]
    fn undefined_variables_fail_the_render() {
        let (_dir, loader) = loader_with("svc.yaml", "name: {{ missing }}\n");
        let err = loader
            .render("svc.yaml", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::Template { .. }));
    }

    #[test]
    fn missing_file_names_the_template() {
        let (_dir, loader) = loader_with("svc.yaml", "");
        let err = loader
            .render("nope.yaml", &serde_json::json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("nope.yaml"));
    }

    #[test]
    fn loads_a_typed_kubernetes_object() {
        let (_dir, loader) = loader_with(
            "apiserver-service.yaml",
            r#"
apiVersion: v1
kind: Service
metadata:
  name: apiserver
spec:
  type: NodePort
  ports:
    - port: 443
      nodePort: {{ external_port }}
"#,
        );
        let ctx = serde_json::json!({ "external_port": 30000 });
        let svc: Service = loader.load("apiserver-service.yaml", &ctx).unwrap();
        assert_eq!(svc.metadata.name.as_deref(), Some("apiserver"));
        let ports = svc.spec.unwrap().ports.unwrap();
        assert_eq!(ports[0].node_port, Some(30000));
    }

    #[test]
    fn parse_yaml_handles_nested_manifests() {
        let value = parse_yaml("metadata:\n  name: x\nspec:\n  replicas: 2\n").unwrap();
        assert_eq!(value["metadata"]["name"], "x");
        assert_eq!(value["spec"]["replicas"], 2);
    }

    #[test]
    fn parse_yaml_of_empty_input_is_null() {
        assert_eq!(parse_yaml("").unwrap(), Value::Null);
    }
}
