//! HelmRelease resources
//!
//! Only the fields needed to expand a release are read: the chart name and
//! version, the `sourceRef` pointing at the repository resource, the target
//! namespace, the release name and the values.

use hrx_core::{ResourceNode, Values};
use serde_yaml::Value as YamlValue;

use crate::error::{PipelineError, Result};

/// API group of Flux Helm releases
pub const RELEASE_GROUP: &str = "helm.toolkit.fluxcd.io";
pub const RELEASE_KIND: &str = "HelmRelease";

/// Whether `node` is a Flux HelmRelease, any API version
pub fn is_helm_release(node: &ResourceNode) -> bool {
    node.group() == RELEASE_GROUP && node.kind() == RELEASE_KIND
}

/// Reference from a release to its repository resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    /// Matched only when set
    pub api_version: Option<String>,
}

impl SourceRef {
    pub fn matches(&self, node: &ResourceNode) -> bool {
        node.kind() == self.kind
            && node.name() == self.name
            && node.namespace() == self.namespace
            && self
                .api_version
                .as_deref()
                .is_none_or(|api_version| node.api_version() == api_version)
    }
}

#[derive(Debug, Clone)]
pub struct HelmRelease {
    pub namespace: String,
    pub name: String,
    pub chart: String,
    /// Version constraint, empty for the latest version
    pub version: String,
    pub source_ref: SourceRef,
    pub target_namespace: Option<String>,
    pub release_name: Option<String>,
    pub values: Values,
}

impl HelmRelease {
    pub fn from_node(node: &ResourceNode) -> Result<Self> {
        let namespace = node.namespace().to_string();
        let name = node.name().to_string();
        let invalid = |message: String| PipelineError::InvalidRelease {
            namespace: namespace.clone(),
            name: name.clone(),
            message,
        };

        let required = |path: &str| {
            node.get_str(path)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("{} is required", path)))
        };

        let source_ref = SourceRef {
            kind: required("spec.chart.spec.sourceRef.kind")?,
            name: required("spec.chart.spec.sourceRef.name")?,
            namespace: node
                .get_str_or("spec.chart.spec.sourceRef.namespace", &namespace)
                .to_string(),
            api_version: node
                .get_str("spec.chart.spec.sourceRef.apiVersion")
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        };
        let chart = required("spec.chart.spec.chart")?;

        let values = match node.get("spec.values") {
            None | Some(YamlValue::Null) => Values::new(),
            Some(value @ YamlValue::Mapping(_)) => serde_yaml::from_value::<serde_json::Value>(value.clone())
                .map(Values::from)
                .map_err(|e| invalid(format!("invalid spec.values: {}", e)))?,
            Some(_) => return Err(invalid("spec.values must be a mapping".to_string())),
        };

        let optional = |path: &str| {
            node.get_str(path)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            chart,
            version: node.get_str("spec.chart.spec.version").unwrap_or_default().to_string(),
            source_ref,
            target_namespace: optional("spec.targetNamespace"),
            release_name: optional("spec.releaseName"),
            values,
            namespace,
            name,
        })
    }

    /// `spec.targetNamespace`, or the release's own namespace
    pub fn target_namespace(&self) -> &str {
        self.target_namespace.as_deref().unwrap_or(&self.namespace)
    }

    /// `spec.releaseName`, or `<targetNamespace>-<name>`
    pub fn release_name(&self) -> String {
        match &self.release_name {
            Some(name) => name.clone(),
            None => format!("{}-{}", self.target_namespace(), self.name),
        }
    }

    /// First node matching the release's `sourceRef`
    pub fn find_repository<'a>(&self, nodes: &'a [ResourceNode]) -> Option<&'a ResourceNode> {
        nodes.iter().find(|node| self.source_ref.matches(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(yaml: &str) -> ResourceNode {
        ResourceNode::from_yaml(yaml).unwrap()
    }

    const RELEASE: &str = r#"apiVersion: helm.toolkit.fluxcd.io/v2
kind: HelmRelease
metadata:
  name: test
  namespace: testns
spec:
  chart:
    spec:
      chart: test-chart
      version: ">=0.1.0"
      sourceRef:
        kind: HelmRepository
        name: test-repo
  values:
    data:
      foo: baz
"#;

    #[test]
    fn test_defaults() {
        let node = release(RELEASE);
        assert!(is_helm_release(&node));

        let release = HelmRelease::from_node(&node).unwrap();
        assert_eq!(release.chart, "test-chart");
        assert_eq!(release.version, ">=0.1.0");
        assert_eq!(release.source_ref.namespace, "testns");
        assert_eq!(release.source_ref.api_version, None);
        assert_eq!(release.target_namespace(), "testns");
        assert_eq!(release.release_name(), "testns-test");
        assert_eq!(release.values.get("data.foo").unwrap(), "baz");
    }

    #[test]
    fn test_overrides() {
        let node = release(
            r#"apiVersion: helm.toolkit.fluxcd.io/v2beta1
kind: HelmRelease
metadata: {name: web, namespace: flux}
spec:
  targetNamespace: apps
  releaseName: frontend
  chart:
    spec:
      chart: ./charts/web
      sourceRef: {kind: GitRepository, name: infra, namespace: shared, apiVersion: source.toolkit.fluxcd.io/v1}
"#,
        );
        let release = HelmRelease::from_node(&node).unwrap();
        assert_eq!(release.target_namespace(), "apps");
        assert_eq!(release.release_name(), "frontend");
        assert_eq!(release.version, "");
        assert!(release.values.is_empty());
        assert_eq!(release.source_ref.namespace, "shared");
    }

    #[test]
    fn test_not_a_release() {
        let other_group = release("apiVersion: example.com/v1\nkind: HelmRelease\nmetadata: {name: x}\n");
        assert!(!is_helm_release(&other_group));
        let config_map = release("apiVersion: v1\nkind: ConfigMap\nmetadata: {name: x}\n");
        assert!(!is_helm_release(&config_map));
    }

    #[test]
    fn test_missing_source_ref() {
        let node = release(
            "apiVersion: helm.toolkit.fluxcd.io/v2\nkind: HelmRelease\nmetadata: {name: web, namespace: apps}\nspec:\n  chart:\n    spec: {chart: web}\n",
        );
        let err = HelmRelease::from_node(&node).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid Helm release apps/web: spec.chart.spec.sourceRef.kind is required"
        );
    }

    #[test]
    fn test_find_repository() {
        let nodes = hrx_core::read_documents(
            r#"apiVersion: source.toolkit.fluxcd.io/v1
kind: HelmRepository
metadata: {name: test-repo, namespace: other}
---
apiVersion: source.toolkit.fluxcd.io/v1
kind: HelmRepository
metadata: {name: test-repo, namespace: testns}
"#,
        )
        .unwrap();
        let release = HelmRelease::from_node(&release(RELEASE)).unwrap();
        let found = release.find_repository(&nodes).unwrap();
        assert_eq!(found.namespace(), "testns");

        let mut pinned = release.clone();
        pinned.source_ref.api_version = Some("source.toolkit.fluxcd.io/v1beta2".to_string());
        assert!(pinned.find_repository(&nodes).is_none());
    }
}
