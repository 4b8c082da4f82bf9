//! Repository URL normalization and chart paths

use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::error::{RepoError, Result};

/// Normalize a repository URL
///
/// OCI URLs lose their trailing slash, every other scheme gets exactly one,
/// so index and chart URLs compose predictably. An empty input stays empty.
pub fn normalize_url(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    let parsed = parse_url(raw)?;
    let trimmed = parsed.as_str().trim_end_matches('/');
    if parsed.scheme() == "oci" {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}/", trimmed))
    }
}

pub fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Directory name a repository URL maps to under the cache root
pub fn cache_dir_name(url: &str) -> String {
    url.trim_end_matches('/').replace('/', "#")
}

/// Where a dependency's `repository` field points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// No repository: the chart is bundled in the parent's `charts/`
    Bundled,
    /// A path relative to the parent chart (`file://../common`, `../common`)
    Relative(String),
    /// A remote repository, normalized
    Remote(String),
}

impl DependencySource {
    pub fn parse(repository: &str) -> Result<Self> {
        let repository = repository.trim();
        if repository.is_empty() {
            return Ok(Self::Bundled);
        }
        if let Some(path) = repository.strip_prefix("file://") {
            return Ok(Self::Relative(path.trim_end_matches('/').to_string()));
        }
        match Url::parse(repository) {
            Ok(_) => Ok(Self::Remote(normalize_url(repository)?)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(Self::Relative(repository.trim_end_matches('/').to_string()))
            }
            Err(e) => Err(RepoError::InvalidRepositoryUrl {
                url: repository.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Join a relative chart path onto a parent chart path inside a checkout
///
/// `..` components are resolved lexically; an absolute `relative` replaces
/// the parent path.
pub fn join_chart_path(parent: &str, relative: &str) -> String {
    let joined = if Path::new(relative).is_absolute() {
        PathBuf::from(relative)
    } else {
        Path::new(parent).join(relative)
    };

    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in joined.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
