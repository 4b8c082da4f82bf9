//! Rendering inputs: release options and cluster capabilities

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// API versions every cluster is assumed to serve
pub const DEFAULT_API_VERSIONS: &[&str] = &[
    "v1",
    "admissionregistration.k8s.io/v1",
    "apiextensions.k8s.io/v1",
    "apiregistration.k8s.io/v1",
    "apps/v1",
    "authentication.k8s.io/v1",
    "authorization.k8s.io/v1",
    "autoscaling/v1",
    "autoscaling/v2",
    "batch/v1",
    "certificates.k8s.io/v1",
    "coordination.k8s.io/v1",
    "discovery.k8s.io/v1",
    "events.k8s.io/v1",
    "networking.k8s.io/v1",
    "node.k8s.io/v1",
    "policy/v1",
    "rbac.authorization.k8s.io/v1",
    "scheduling.k8s.io/v1",
    "storage.k8s.io/v1",
];

/// Release information exposed to templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseOptions {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub is_install: bool,
    pub is_upgrade: bool,
    pub service: String,
}

impl ReleaseOptions {
    /// Options for a first install of `name` into `namespace`
    pub fn for_install(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            revision: 1,
            is_install: true,
            is_upgrade: false,
            service: "Helm".to_string(),
        }
    }
}

/// Cluster capabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub kube_version: KubeVersion,

    #[serde(rename = "APIVersions")]
    pub api_versions: Vec<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            kube_version: KubeVersion::default(),
            api_versions: DEFAULT_API_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl Capabilities {
    /// Default capabilities with an optional kube version override and
    /// extra API versions appended to the defaults
    pub fn with_overrides(kube_version: Option<KubeVersion>, extra_api_versions: &[String]) -> Self {
        let mut capabilities = Self::default();
        if let Some(version) = kube_version {
            capabilities.kube_version = version;
        }
        capabilities
            .api_versions
            .extend(extra_api_versions.iter().cloned());
        capabilities
    }
}

/// Kubernetes version info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KubeVersion {
    pub version: String,
    pub major: String,
    pub minor: String,
}

impl Default for KubeVersion {
    fn default() -> Self {
        Self {
            version: "v1.28.0".to_string(),
            major: "1".to_string(),
            minor: "28".to_string(),
        }
    }
}

impl KubeVersion {
    /// Parse "1.28", "v1.28.3" or "1.28.3-gke.100"
    pub fn parse(version: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidKubeVersion {
            version: version.to_string(),
            message: message.to_string(),
        };

        let trimmed = version.trim().trim_start_matches('v');
        let (core, suffix) = match trimmed.split_once(['-', '+']) {
            Some((core, _)) => (core, &trimmed[core.len()..]),
            None => (trimmed, ""),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid("expected MAJOR.MINOR[.PATCH]"));
        }
        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| invalid("version components must be numeric"))?;
        }

        Ok(Self {
            version: format!("v{}.{}.{}{}", numbers[0], numbers[1], numbers[2], suffix),
            major: numbers[0].to_string(),
            minor: numbers[1].to_string(),
        })
    }
}
