//! Repository kinds
//!
//! A chart source is selected either from a repository resource (by its
//! `kind`, and `spec.type` for `HelmRepository`) or from a bare URL (by its
//! scheme) when a chart dependency points at a remote repository.

use hrx_core::ResourceNode;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::fmt;
use std::time::Duration;

use crate::error::{RepoError, Result};
use crate::git::GitReference;
use crate::location::{normalize_url, parse_url};

/// Default deadline for a Git clone
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Namespace and name of the repository resource a source came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryMeta {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for RepositoryMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A chart source with its backend-specific settings
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryKind {
    Git(GitSource),
    Helm(HelmSource),
    Oci(OciSource),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GitSource {
    pub meta: Option<RepositoryMeta>,
    /// Clone URL as written in the resource
    pub url: String,
    /// Normalized reference (`{branch: master}` when nothing is set)
    pub reference: GitReference,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelmSource {
    pub meta: Option<RepositoryMeta>,
    /// Normalized URL with a trailing slash
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OciSource {
    pub meta: Option<RepositoryMeta>,
    /// Normalized URL without a trailing slash
    pub url: String,
    /// Plain HTTP registry
    pub insecure: bool,
    /// Cloud provider declared on the resource (`aws`, `azure`, `gcp`)
    pub provider: Option<String>,
}

/// The parts of a Flux source `spec` that matter here
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceSpec {
    #[serde(default)]
    url: String,

    #[serde(default, rename = "type")]
    repo_type: Option<String>,

    #[serde(default)]
    insecure: bool,

    #[serde(default)]
    provider: Option<String>,

    #[serde(default, rename = "ref")]
    reference: Option<GitReference>,

    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

impl RepositoryKind {
    /// Select the backend for a repository resource
    pub fn from_node(node: &ResourceNode) -> Result<Self> {
        let meta = RepositoryMeta {
            namespace: node.namespace().to_string(),
            name: node.name().to_string(),
        };
        let spec = decode_spec(node, &meta)?;

        match node.kind() {
            "GitRepository" => Ok(Self::Git(GitSource {
                url: spec.url,
                reference: spec.reference.unwrap_or_default().normalized(),
                timeout: spec.timeout.unwrap_or(DEFAULT_GIT_TIMEOUT),
                meta: Some(meta),
            })),
            "HelmRepository" if spec.repo_type.as_deref() == Some("oci") => {
                Ok(Self::Oci(OciSource {
                    url: normalize_url(&spec.url)?,
                    insecure: spec.insecure,
                    provider: spec.provider,
                    meta: Some(meta),
                }))
            }
            "HelmRepository" => Ok(Self::Helm(HelmSource {
                url: normalize_url(&spec.url)?,
                meta: Some(meta),
            })),
            "OCIRepository" => Ok(Self::Oci(OciSource {
                url: normalize_url(&spec.url)?,
                insecure: spec.insecure,
                provider: spec.provider,
                meta: Some(meta),
            })),
            other => Err(RepoError::UnknownRepositoryKind {
                kind: other.to_string(),
                namespace: meta.namespace,
                name: meta.name,
            }),
        }
    }

    /// Select the backend for a bare repository URL
    ///
    /// `oci://` is a registry, `ssh://` a Git remote, and `http(s)://` a Git
    /// remote when the user is `git` (`https://git@host/...`), otherwise a
    /// Helm index.
    pub fn from_url(raw: &str) -> Result<Self> {
        let parsed = parse_url(raw)?;
        match parsed.scheme() {
            "http" | "https" if parsed.username() == "git" => Ok(Self::Git(GitSource {
                meta: None,
                url: raw.to_string(),
                reference: GitReference::default().normalized(),
                timeout: DEFAULT_GIT_TIMEOUT,
            })),
            "http" | "https" => Ok(Self::Helm(HelmSource {
                meta: None,
                url: normalize_url(raw)?,
            })),
            "ssh" => Ok(Self::Git(GitSource {
                meta: None,
                url: raw.to_string(),
                reference: GitReference::default().normalized(),
                timeout: DEFAULT_GIT_TIMEOUT,
            })),
            "oci" => Ok(Self::Oci(OciSource {
                meta: None,
                url: normalize_url(raw)?,
                insecure: false,
                provider: None,
            })),
            _ => Err(RepoError::UnknownUrlScheme {
                url: raw.to_string(),
            }),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Git(git) => &git.url,
            Self::Helm(helm) => &helm.url,
            Self::Oci(oci) => &oci.url,
        }
    }

    pub fn meta(&self) -> Option<&RepositoryMeta> {
        match self {
            Self::Git(git) => git.meta.as_ref(),
            Self::Helm(helm) => helm.meta.as_ref(),
            Self::Oci(oci) => oci.meta.as_ref(),
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Git(_) => "GitRepository",
            Self::Helm(_) => "Helm repository",
            Self::Oci(_) => "OCI repository",
        };
        match self.meta() {
            Some(meta) => write!(f, "{} {}", kind, meta),
            None => write!(f, "{} {}", kind, self.url()),
        }
    }
}

fn decode_spec(node: &ResourceNode, meta: &RepositoryMeta) -> Result<SourceSpec> {
    match node.get("spec") {
        None | Some(YamlValue::Null) => Ok(SourceSpec::default()),
        Some(spec) => serde_yaml::from_value(spec.clone()).map_err(|e| {
            RepoError::InvalidRepository {
                namespace: meta.namespace.clone(),
                name: meta.name.clone(),
                message: e.to_string(),
            }
        }),
    }
}
