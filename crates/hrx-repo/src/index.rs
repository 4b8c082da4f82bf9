//! Helm repository index
//!
//! The `index.yaml` served at the root of an HTTP chart repository.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::error::{RepoError, Result};
use crate::version::{parse_version, Constraint};

/// Repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions by chart name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl RepositoryIndex {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::InvalidIndex {
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::InvalidIndex {
            message: format!("invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// All versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Highest version of `name` satisfying `constraint`
    pub fn find_best_match(
        &self,
        name: &str,
        constraint: &Constraint,
        repo_url: &str,
    ) -> Result<&ChartEntry> {
        let entries = self
            .entries
            .get(name)
            .ok_or_else(|| RepoError::ChartNotInIndex {
                name: name.to_string(),
                url: repo_url.to_string(),
            })?;

        entries
            .iter()
            .filter_map(|entry| entry.parsed_version().map(|v| (entry, v)))
            .filter(|(_, version)| constraint.matches(version))
            .max_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(entry, _)| entry)
            .ok_or_else(|| RepoError::UnsatisfiableConstraint {
                name: name.to_string(),
                constraint: constraint.to_string(),
                available: entries
                    .iter()
                    .map(|e| e.version.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// One chart version in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Archive locations, absolute or relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deprecated: bool,
}

impl ChartEntry {
    pub fn parsed_version(&self) -> Option<Version> {
        parse_version(&self.version)
    }

    /// Absolute download URL, resolving relative entries against `repo_url`
    pub fn download_url(&self, repo_url: &str) -> Result<String> {
        let raw = self
            .urls
            .first()
            .ok_or_else(|| RepoError::MissingDownloadUrl {
                name: self.name.clone(),
                version: self.version.clone(),
            })?;

        match Url::parse(raw) {
            Ok(absolute) => Ok(absolute.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(repo_url).map_err(|e| RepoError::InvalidRepositoryUrl {
                    url: repo_url.to_string(),
                    reason: e.to_string(),
                })?;
                let joined = base.join(raw).map_err(|e| RepoError::InvalidRepositoryUrl {
                    url: raw.clone(),
                    reason: e.to_string(),
                })?;
                Ok(joined.to_string())
            }
            Err(e) => Err(RepoError::InvalidRepositoryUrl {
                url: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
