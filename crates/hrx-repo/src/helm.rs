//! HTTP chart repositories
//!
//! The repository index is downloaded once per cache root and kept as
//! `repo-index.yaml` next to the extracted charts. Chart versions are picked
//! from the index, so the index on disk decides what a constraint resolves
//! to until the cache is cleared.

use hrx_core::archive::read_archive_files;
use hrx_core::Chart;
use std::path::Path;
use std::sync::Arc;

use crate::cache::{self, ChartIdentity};
use crate::dependency::resolve_dependencies;
use crate::error::{RepoError, Result};
use crate::http::HttpClient;
use crate::index::RepositoryIndex;
use crate::loader::ChartLoader;
use crate::location::parse_url;
use crate::source::{HelmSource, RepositoryKind};
use crate::version::Constraint;

/// Name of the cached index below a repository directory
pub const INDEX_FILE: &str = "repo-index.yaml";

/// Load `chart_name` from a Helm repository
pub(crate) async fn load_chart(
    loader: &ChartLoader,
    source: &HelmSource,
    chart_name: &str,
    version: &str,
) -> Result<Arc<Chart>> {
    load(loader, source, chart_name, version)
        .await
        .map_err(|e| e.for_chart(chart_name, RepositoryKind::Helm(source.clone()).to_string()))
}

async fn load(
    loader: &ChartLoader,
    source: &HelmSource,
    chart_name: &str,
    version: &str,
) -> Result<Arc<Chart>> {
    let url = parse_url(&source.url)?;
    let credentials = loader.credentials_for(&url);
    let http = HttpClient::new(credentials.as_ref())?;

    let repo_path = loader.cache().repository_dir(&source.url, false);
    let index = load_index(&http, &source.url, &repo_path).await?;

    let constraint = Constraint::parse(version)?;
    let entry = index.find_best_match(chart_name, &constraint, &source.url)?;

    let identity = ChartIdentity::new(source.url.as_str(), chart_name, [entry.version.as_str()]);
    if let Some(chart) = loader.cache().get(&identity) {
        return Ok(chart);
    }

    let chart_dir = repo_path.join(format!("{}-{}", chart_name, entry.version));
    let mut chart = match cache::load_from_disk(&chart_dir)? {
        Some(chart) => chart,
        None => {
            let chart_url = entry.download_url(&source.url)?;
            tracing::debug!(url = %chart_url, version = %entry.version, "downloading chart");

            let data = if chart_url.starts_with("oci://") {
                loader.registries().create(false)?.pull_chart(&chart_url).await?
            } else {
                http.download_verified(&chart_url, entry.digest.as_deref())
                    .await?
            };
            let files = read_archive_files(&data)?;
            cache::persist(&files, &chart_dir)?;
            Chart::from_files(files)?
        }
    };

    resolve_dependencies(loader, &mut chart, None).await?;

    let chart = Arc::new(chart);
    loader.cache().insert(identity, chart.clone());
    Ok(chart)
}

/// Cached index of the repository, downloading it when absent
async fn load_index(http: &HttpClient, repo_url: &str, repo_path: &Path) -> Result<RepositoryIndex> {
    let index_path = repo_path.join(INDEX_FILE);
    if index_path.is_file() {
        match RepositoryIndex::from_bytes(&std::fs::read(&index_path)?) {
            Ok(index) => return Ok(index),
            Err(e) => tracing::warn!(
                path = %index_path.display(),
                error = %e,
                "cached repository index is unreadable, downloading again"
            ),
        }
    }

    let index_url = format!("{}index.yaml", repo_url);
    tracing::debug!(url = %index_url, "downloading repository index");
    let data = http
        .get_bytes(&index_url)
        .await
        .map_err(|e| RepoError::IndexDownload {
            url: repo_url.to_string(),
            source: Box::new(e),
        })?;
    let index = RepositoryIndex::from_bytes(&data)?;

    std::fs::create_dir_all(repo_path)?;
    std::fs::write(&index_path, &data)?;
    Ok(index)
}
