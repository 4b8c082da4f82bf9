//! Chart model
//!
//! A chart is a named, versioned bundle of templates, default values and
//! declared dependencies. Charts are loaded from a directory, from a
//! gzipped archive, or from an in-memory list of files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::archive::{ChartFile, read_archive_files};
use crate::error::{CoreError, Result};
use crate::values::Values;

/// Contents of `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ChartDependency>,
}

fn default_api_version() -> String {
    "v2".to_string()
}

/// A dependency declared in `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDependency {
    pub name: String,

    /// Version constraint
    #[serde(default)]
    pub version: String,

    /// Repository locator. Empty for charts bundled under `charts/`.
    #[serde(default)]
    pub repository: String,

    /// Comma-separated value paths enabling this dependency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Static enable flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl ChartDependency {
    /// Alias if set, otherwise the chart name
    #[inline]
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A loaded chart tree
///
/// `dependencies` holds bundled subcharts found under `charts/` as well as
/// dependencies attached after resolution. Dependencies are shared
/// read-only once attached.
#[derive(Debug, Clone)]
pub struct Chart {
    pub metadata: ChartMetadata,
    pub values: Values,
    pub templates: Vec<ChartFile>,
    pub files: Vec<ChartFile>,
    pub dependencies: Vec<Arc<Chart>>,
}

impl Chart {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Load a chart from a directory on disk
    pub fn load_dir<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref();
        if !root.is_dir() {
            return Err(CoreError::ChartNotFound {
                path: root.display().to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| CoreError::InvalidChart {
                message: format!("unable to read {}: {}", root.display(), e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| CoreError::InvalidChart {
                    message: e.to_string(),
                })?;
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if name.starts_with(".git/") {
                continue;
            }
            files.push(ChartFile::new(name, std::fs::read(entry.path())?));
        }

        Self::from_files(files).map_err(|e| match e {
            CoreError::InvalidChart { message } => CoreError::InvalidChart {
                message: format!("{} ({})", message, root.display()),
            },
            other => other,
        })
    }

    /// Load a chart from a gzipped tarball
    pub fn load_archive(data: &[u8]) -> Result<Self> {
        Self::from_files(read_archive_files(data)?)
    }

    /// Assemble a chart from files relative to its root
    pub fn from_files(files: Vec<ChartFile>) -> Result<Self> {
        let mut metadata = None;
        let mut values = Values::new();
        let mut templates = Vec::new();
        let mut others = Vec::new();
        let mut subcharts: BTreeMap<String, Vec<ChartFile>> = BTreeMap::new();
        let mut archives = Vec::new();

        for file in files {
            if file.name == "Chart.yaml" {
                let parsed: ChartMetadata =
                    serde_yaml::from_slice(&file.data).map_err(|e| CoreError::InvalidChart {
                        message: format!("invalid Chart.yaml: {}", e),
                    })?;
                metadata = Some(parsed);
            } else if file.name == "values.yaml" {
                if !file.text().trim().is_empty() {
                    values = Values::from_yaml(&file.text())?;
                }
            } else if file.name.starts_with("templates/") {
                templates.push(file);
            } else if let Some(rest) = file.name.strip_prefix("charts/") {
                match rest.split_once('/') {
                    Some((dir, inner)) => {
                        let inner = ChartFile::new(inner, file.data);
                        subcharts.entry(dir.to_string()).or_default().push(inner);
                    }
                    None if rest.ends_with(".tgz") || rest.ends_with(".tar.gz") => {
                        archives.push(file);
                    }
                    None => others.push(file),
                }
            } else {
                others.push(file);
            }
        }

        let metadata = metadata.ok_or_else(|| CoreError::InvalidChart {
            message: "Chart.yaml file is missing".to_string(),
        })?;
        if metadata.name.is_empty() {
            return Err(CoreError::MissingField {
                field: "Chart.yaml name".to_string(),
            });
        }
        if metadata.version.is_empty() {
            return Err(CoreError::MissingField {
                field: format!("version in Chart.yaml for {}", metadata.name),
            });
        }

        let mut dependencies = Vec::new();
        for (dir, sub_files) in subcharts {
            let sub = Self::from_files(sub_files).map_err(|e| CoreError::InvalidChart {
                message: format!("unable to load subchart {}: {}", dir, e),
            })?;
            dependencies.push(Arc::new(sub));
        }
        for archive in archives {
            let sub = Self::load_archive(&archive.data).map_err(|e| CoreError::InvalidChart {
                message: format!("unable to load subchart {}: {}", archive.name, e),
            })?;
            dependencies.push(Arc::new(sub));
        }

        templates.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            metadata,
            values,
            templates,
            files: others,
            dependencies,
        })
    }

    /// Attach a resolved dependency, replacing any subchart with the same name
    ///
    /// One loaded chart is kept per chart name. Several aliased declarations
    /// of the same chart share it and are still rendered once per alias, but
    /// when they ask for different versions the one resolved last is used.
    pub fn add_dependency(&mut self, chart: Arc<Chart>) {
        self.dependencies.retain(|d| d.name() != chart.name());
        self.dependencies.push(chart);
    }

    /// Find an attached or bundled subchart by chart name
    pub fn dependency(&self, name: &str) -> Option<&Arc<Chart>> {
        self.dependencies.iter().find(|d| d.name() == name)
    }

    /// Whether a subchart with this name is bundled or attached
    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependency(name).is_some()
    }
}
