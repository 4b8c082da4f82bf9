//! Chart loading entry point
//!
//! [`ChartLoader`] owns everything a load needs for one expansion: the
//! chart cache, the credentials, and the Git and registry clients. Each
//! [`RepositoryKind`] is served by its own backend module.

use hrx_core::Chart;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

use crate::cache::ChartCache;
use crate::context::ChartContext;
use crate::credentials::{CredentialValues, Credentials};
use crate::error::Result;
use crate::git::{self, GitClient, GitRepoSubstitution, SystemGit};
use crate::helm;
use crate::oci::{self, OciDistributionFactory, RegistryClientFactory};
use crate::source::RepositoryKind;

/// Boxed so dependency resolution can re-enter the loader
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<Chart>>> + Send + 'a>>;

/// Environment variable lookup used to expand credential placeholders
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads charts from any [`RepositoryKind`]
pub struct ChartLoader {
    cache: ChartCache,
    credentials: Credentials,
    env: EnvLookup,
    git: Arc<dyn GitClient>,
    registries: Arc<dyn RegistryClientFactory>,
    git_substitution: Option<GitRepoSubstitution>,
}

impl ChartLoader {
    pub fn builder(cache: ChartCache) -> ChartLoaderBuilder {
        ChartLoaderBuilder {
            cache,
            credentials: Credentials::default(),
            env: None,
            git: None,
            registries: None,
            git_substitution: None,
        }
    }

    /// Load `chart` with its dependencies attached
    ///
    /// `version` is a constraint for Helm and OCI sources and ignored for
    /// Git, where `chart` is a path inside the repository. `parent` is only
    /// set when resolving a relative dependency of a chart from the same
    /// working copy.
    pub fn load<'a>(
        &'a self,
        source: &'a RepositoryKind,
        chart: &'a str,
        version: &'a str,
        parent: Option<&'a ChartContext>,
    ) -> LoadFuture<'a> {
        Box::pin(async move {
            match source {
                RepositoryKind::Git(git) => git::load_chart(self, git, chart, parent).await,
                RepositoryKind::Helm(helm) => helm::load_chart(self, helm, chart, version).await,
                RepositoryKind::Oci(oci) => oci::load_chart(self, oci, chart, version).await,
            }
        })
    }

    pub fn cache(&self) -> &ChartCache {
        &self.cache
    }

    /// Credentials for `url` with placeholders expanded now
    pub fn credentials_for(&self, url: &Url) -> Option<CredentialValues> {
        self.credentials.find_for_repo_with(url, |name| (self.env)(name))
    }

    pub fn git_client(&self) -> &dyn GitClient {
        self.git.as_ref()
    }

    pub fn registries(&self) -> &dyn RegistryClientFactory {
        self.registries.as_ref()
    }

    pub fn git_substitution(&self) -> Option<&GitRepoSubstitution> {
        self.git_substitution.as_ref()
    }
}

/// Builder for [`ChartLoader`]
pub struct ChartLoaderBuilder {
    cache: ChartCache,
    credentials: Credentials,
    env: Option<EnvLookup>,
    git: Option<Arc<dyn GitClient>>,
    registries: Option<Arc<dyn RegistryClientFactory>>,
    git_substitution: Option<GitRepoSubstitution>,
}

impl ChartLoaderBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Variable lookup for credential placeholders (default: process environment)
    pub fn env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Some(Arc::new(lookup));
        self
    }

    /// Git client (default: the `git` executable)
    pub fn git_client(mut self, client: Arc<dyn GitClient>) -> Self {
        self.git = Some(client);
        self
    }

    /// Registry clients (default: `oci-distribution`)
    pub fn registry_clients(mut self, factory: Arc<dyn RegistryClientFactory>) -> Self {
        self.registries = Some(factory);
        self
    }

    pub fn git_substitution(mut self, substitution: Option<GitRepoSubstitution>) -> Self {
        self.git_substitution = substitution;
        self
    }

    pub fn build(self) -> ChartLoader {
        ChartLoader {
            cache: self.cache,
            credentials: self.credentials,
            env: self
                .env
                .unwrap_or_else(|| Arc::new(|name: &str| std::env::var(name).ok())),
            git: self.git.unwrap_or_else(|| Arc::new(SystemGit::default())),
            registries: self
                .registries
                .unwrap_or_else(|| Arc::new(OciDistributionFactory)),
            git_substitution: self.git_substitution,
        }
    }
}
