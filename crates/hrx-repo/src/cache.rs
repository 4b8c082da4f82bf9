//! Two-tier chart cache
//!
//! - Memory: resolved chart trees keyed by [`ChartIdentity`], scoped to one
//!   expansion and consulted before any disk or network access
//! - Disk: extracted chart files under a root directory, one subdirectory
//!   per repository URL. Floating Git references live under `ephemeral/`,
//!   which is removed when the expansion finishes.

use hrx_core::archive::{self, ChartFile};
use hrx_core::Chart;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{RepoError, Result};
use crate::location::cache_dir_name;

const EPHEMERAL_DIR: &str = "ephemeral";

/// Key of a resolved chart
///
/// `revision` holds the resolved version for index and registry charts and
/// the five Git reference slots (branch, tag, semver, name, commit) for Git
/// charts, with unset slots as empty strings so different reference kinds
/// never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartIdentity {
    url: String,
    chart: String,
    revision: Vec<String>,
}

impl ChartIdentity {
    pub fn new<I, S>(url: impl Into<String>, chart: impl Into<String>, revision: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            url: url.into(),
            chart: chart.into(),
            revision: revision.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ChartIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.url, self.chart)?;
        for slot in &self.revision {
            write!(f, "#{}", slot)?;
        }
        Ok(())
    }
}

/// Chart cache shared by every loader of one expansion
#[derive(Debug)]
pub struct ChartCache {
    root: PathBuf,
    memory: Option<Mutex<HashMap<ChartIdentity, Arc<Chart>>>>,
}

impl ChartCache {
    pub fn new(root: impl Into<PathBuf>, enable_memory: bool) -> Self {
        Self {
            root: root.into(),
            memory: enable_memory.then(Mutex::default),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ephemeral_root(&self) -> PathBuf {
        self.root.join(EPHEMERAL_DIR)
    }

    /// Disk directory of a repository
    pub fn repository_dir(&self, url: &str, ephemeral: bool) -> PathBuf {
        let base = if ephemeral {
            self.ephemeral_root()
        } else {
            self.root.clone()
        };
        base.join(cache_dir_name(url))
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory.is_some()
    }

    pub fn get(&self, identity: &ChartIdentity) -> Option<Arc<Chart>> {
        let memory = self.memory.as_ref()?;
        let found = memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned();
        if found.is_some() {
            tracing::debug!(identity = %identity, "using chart from in-memory cache");
        }
        found
    }

    pub fn insert(&self, identity: ChartIdentity, chart: Arc<Chart>) {
        if let Some(memory) = &self.memory {
            memory
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(identity, chart);
        }
    }

    /// Number of charts held in memory
    pub fn len(&self) -> usize {
        self.memory
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the ephemeral subtree
    pub fn cleanup_ephemeral(&self) -> std::io::Result<()> {
        let dir = self.ephemeral_root();
        match std::fs::remove_dir_all(&dir) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Guard removing the ephemeral subtree when dropped
    pub fn ephemeral_guard(&self) -> EphemeralGuard<'_> {
        EphemeralGuard { cache: self }
    }
}

/// Removes the ephemeral subtree on drop, on success and on error alike
pub struct EphemeralGuard<'a> {
    cache: &'a ChartCache,
}

impl Drop for EphemeralGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.cache.cleanup_ephemeral() {
            tracing::error!(
                directory = %self.cache.ephemeral_root().display(),
                error = %e,
                "unable to clean up ephemeral repository directory"
            );
        }
    }
}

/// Load a chart extracted under `dir`
///
/// Returns `None` when nothing is cached. A directory that no longer loads
/// (for example after an interrupted write) is evicted so the caller can
/// fetch the chart again.
pub fn load_from_disk(dir: &Path) -> Result<Option<Chart>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    match Chart::load_dir(dir) {
        Ok(chart) => {
            tracing::debug!(path = %dir.display(), "using chart from disk cache");
            Ok(Some(chart))
        }
        Err(e) => {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "cached chart is unreadable, evicting"
            );
            std::fs::remove_dir_all(dir).map_err(|io| RepoError::CacheCorrupted {
                path: dir.display().to_string(),
                message: io.to_string(),
            })?;
            Ok(None)
        }
    }
}

/// Persist raw chart files so later runs hit the disk cache
pub fn persist(files: &[ChartFile], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    archive::save_files(files, dir)?;
    Ok(())
}
