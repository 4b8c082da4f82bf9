//! HelmRelease expansion
//!
//! Each round scans the node set for HelmReleases, loads the chart of every
//! release not expanded yet, renders it and appends the produced resources.
//! Rounds repeat over the grown node set until one produces nothing or the
//! round limit is reached; releases emitted by a chart are therefore
//! expanded in the following round.

use hrx_core::{
    apply_namespace_if_unset, read_documents, write_documents, Capabilities, ChartRenderer,
    KubeVersion, ReleaseOptions, ResourceNode,
};
use hrx_engine::Engine;
use hrx_repo::{
    ChartCache, ChartLoader, Credentials, GitClient, GitRepoSubstitution, RegistryClientFactory,
    RepositoryKind,
};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{PipelineError, Result};
use crate::release::{is_helm_release, HelmRelease};

/// Per-invocation settings
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// `Capabilities.KubeVersion` (default `v1.28.0`)
    pub kube_version: Option<KubeVersion>,
    /// Appended to the default `Capabilities.APIVersions`
    pub api_versions: Vec<String>,
    /// Maximum number of expansion rounds
    pub max_expansions: usize,
    /// Persistent chart cache; a temporary directory is used when unset
    pub chart_cache_dir: Option<PathBuf>,
    pub enable_memory_cache: bool,
    pub git_repo_substitution: Option<GitRepoSubstitution>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            kube_version: None,
            api_versions: Vec::new(),
            max_expansions: 1,
            chart_cache_dir: None,
            enable_memory_cache: true,
            git_repo_substitution: None,
        }
    }
}

/// Builder for [`Expander`]
#[derive(Default)]
pub struct ExpanderBuilder {
    renderer: Option<Arc<dyn ChartRenderer>>,
    git: Option<Arc<dyn GitClient>>,
    registries: Option<Arc<dyn RegistryClientFactory>>,
}

impl ExpanderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chart renderer (default: non-strict [`Engine`])
    pub fn renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn git_client(mut self, client: Arc<dyn GitClient>) -> Self {
        self.git = Some(client);
        self
    }

    pub fn registry_clients(mut self, factory: Arc<dyn RegistryClientFactory>) -> Self {
        self.registries = Some(factory);
        self
    }

    pub fn build(self) -> Expander {
        Expander {
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(Engine::new(false))),
            git: self.git,
            registries: self.registries,
        }
    }
}

/// Expands HelmReleases into the resources their charts produce
pub struct Expander {
    renderer: Arc<dyn ChartRenderer>,
    git: Option<Arc<dyn GitClient>>,
    registries: Option<Arc<dyn RegistryClientFactory>>,
}

impl Default for Expander {
    fn default() -> Self {
        ExpanderBuilder::new().build()
    }
}

impl Expander {
    pub fn builder() -> ExpanderBuilder {
        ExpanderBuilder::new()
    }

    /// Read a document stream, expand it and write the result
    ///
    /// Input documents are re-emitted in their original order, followed by
    /// the generated resources of each round. Comments and formatting of
    /// the input are not preserved.
    pub async fn expand<R: Read, W: Write>(
        &self,
        credentials: Credentials,
        mut input: R,
        output: W,
        options: &ExpandOptions,
    ) -> Result<()> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        let nodes = read_documents(&text).map_err(PipelineError::Input)?;

        let nodes = self.expand_nodes(credentials, nodes, options).await?;
        write_documents(&nodes, output).map_err(PipelineError::Output)
    }

    /// Expand an already parsed node set
    pub async fn expand_nodes(
        &self,
        credentials: Credentials,
        mut nodes: Vec<ResourceNode>,
        options: &ExpandOptions,
    ) -> Result<Vec<ResourceNode>> {
        // The scratch directory is removed when dropped at the end of this call
        let (cache_root, _scratch) = match &options.chart_cache_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("chart-repo-cache-")
                    .tempdir()
                    .map_err(PipelineError::CacheDir)?;
                (scratch.path().to_path_buf(), Some(scratch))
            }
        };

        let loader = self.loader(&cache_root, credentials, options);
        let _cleanup = loader.cache().ephemeral_guard();

        let capabilities =
            Capabilities::with_overrides(options.kube_version.clone(), &options.api_versions);
        let mut expanded = HashSet::new();

        for round in 1..=options.max_expansions {
            let started = Instant::now();
            let produced = self
                .expand_round(&loader, &nodes, &mut expanded, &capabilities)
                .await?;
            tracing::debug!(
                round,
                resources = produced.len(),
                duration = ?started.elapsed(),
                "finished expansion round"
            );
            if produced.is_empty() {
                break;
            }
            nodes.extend(produced);
        }
        Ok(nodes)
    }

    fn loader(&self, cache_root: &Path, credentials: Credentials, options: &ExpandOptions) -> ChartLoader {
        let mut builder = ChartLoader::builder(ChartCache::new(cache_root, options.enable_memory_cache))
            .credentials(credentials)
            .git_substitution(options.git_repo_substitution.clone());
        if let Some(git) = &self.git {
            builder = builder.git_client(git.clone());
        }
        if let Some(registries) = &self.registries {
            builder = builder.registry_clients(registries.clone());
        }
        builder.build()
    }

    /// One pass over the node set; returns the new nodes in sorted order
    async fn expand_round(
        &self,
        loader: &ChartLoader,
        nodes: &[ResourceNode],
        expanded: &mut HashSet<(String, String, String, String)>,
        capabilities: &Capabilities,
    ) -> Result<Vec<ResourceNode>> {
        let mut produced = Vec::new();

        for node in nodes.iter().filter(|node| is_helm_release(node)) {
            if !expanded.insert(node.identity()) {
                continue;
            }
            let rendered = self
                .expand_release(loader, nodes, node, capabilities)
                .await
                .map_err(|e| PipelineError::Release {
                    namespace: node.namespace().to_string(),
                    name: node.name().to_string(),
                    source: Box::new(e),
                })?;
            produced.extend(rendered);
        }

        sort_nodes(&mut produced);
        Ok(produced)
    }

    async fn expand_release(
        &self,
        loader: &ChartLoader,
        nodes: &[ResourceNode],
        node: &ResourceNode,
        capabilities: &Capabilities,
    ) -> Result<Vec<ResourceNode>> {
        let release = HelmRelease::from_node(node)?;
        let repository = release
            .find_repository(nodes)
            .ok_or_else(|| PipelineError::MissingRepository {
                namespace: release.namespace.clone(),
                name: release.name.clone(),
            })?;

        let load_error = |source| PipelineError::LoadChart {
            kind: repository.kind().to_string(),
            namespace: repository.namespace().to_string(),
            name: repository.name().to_string(),
            source,
        };
        let source = RepositoryKind::from_node(repository).map_err(load_error)?;
        let chart = loader
            .load(&source, &release.chart, &release.version, None)
            .await
            .map_err(load_error)?;

        tracing::info!(
            namespace = %release.namespace,
            name = %release.name,
            chart = chart.name(),
            version = chart.version(),
            "expanding Helm release"
        );

        let options = ReleaseOptions::for_install(release.release_name(), release.target_namespace());
        let manifests = self
            .renderer
            .render(&chart, &release.values, &options, capabilities)
            .map_err(|source| PipelineError::Render {
                namespace: release.namespace.clone(),
                name: release.name.clone(),
                source,
            })?;

        let mut rendered = Vec::new();
        for (key, manifest) in &manifests {
            if manifest.trim().is_empty() || is_notes(key) {
                continue;
            }
            let documents = read_documents(manifest).map_err(|source| PipelineError::Manifest {
                key: key.clone(),
                namespace: release.namespace.clone(),
                name: release.name.clone(),
                source,
            })?;
            for mut document in documents {
                document.set_head_comment(format!("Source: {}", key));
                rendered.push(document);
            }
        }

        apply_namespace_if_unset(&mut rendered, &release.namespace);
        Ok(rendered)
    }
}

fn is_notes(key: &str) -> bool {
    Path::new(key).file_name().is_some_and(|name| name == "NOTES.txt")
}

/// Order by kind, apiVersion, namespace and name
pub fn sort_nodes(nodes: &mut [ResourceNode]) {
    nodes.sort_by(|a, b| {
        (a.kind(), a.api_version(), a.namespace(), a.name())
            .cmp(&(b.kind(), b.api_version(), b.namespace(), b.name()))
    });
}
