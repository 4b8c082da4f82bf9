//! Expand command - append the rendered manifests of every HelmRelease

use clap::Args;
use hrx_core::KubeVersion;
use hrx_pipeline::{ExpandOptions, Expander};
use hrx_repo::{Credentials, GitRepoSubstitution};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::commands::open_input;
use crate::error::{CliError, Result};

#[derive(Args, Debug, Clone)]
pub struct ExpandArgs {
    /// File with the input documents (default: stdin)
    pub file: Option<PathBuf>,

    /// Name of the repository credentials file
    #[arg(long, env = "HRX_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Kubernetes version used for Capabilities.KubeVersion in charts
    #[arg(long, default_value = "1.28", env = "HRX_KUBE_VERSION")]
    pub kube_version: String,

    /// Kubernetes API versions used for Capabilities.APIVersions in charts
    #[arg(long, value_delimiter = ',')]
    pub api_versions: Vec<String>,

    /// Maximum number of expansions to perform recursively
    #[arg(long, default_value_t = 1)]
    pub max_expansions: usize,

    /// Directory to cache Helm charts (default: a temporary directory)
    #[arg(long, env = "HRX_CHART_CACHE_DIR")]
    pub chart_cache_dir: Option<PathBuf>,

    /// Local working copy to use instead of cloning: <repo-url>#[<branch>#]<path>
    #[arg(long, env = "HRX_GIT_REPO_SUBSTITUTION")]
    pub git_repo_substitution: Option<String>,
}

pub async fn run(args: &ExpandArgs) -> Result<()> {
    let started = Instant::now();
    tracing::info!("Starting expand command");
    let result = expand(args).await;
    tracing::info!(duration = ?started.elapsed(), "Finished expand command");
    result
}

async fn expand(args: &ExpandArgs) -> Result<()> {
    let kube_version =
        KubeVersion::parse(&args.kube_version).map_err(|source| CliError::KubeVersion {
            value: args.kube_version.clone(),
            source,
        })?;

    let git_repo_substitution = match args.git_repo_substitution.as_deref() {
        Some(value) => GitRepoSubstitution::parse(value).map_err(|e| CliError::usage(e.to_string()))?,
        None => None,
    };

    let credentials = match &args.credentials_file {
        Some(path) => read_credentials(path)?,
        None => Credentials::default(),
    };

    let options = ExpandOptions {
        kube_version: Some(kube_version),
        api_versions: args.api_versions.clone(),
        max_expansions: args.max_expansions,
        chart_cache_dir: args.chart_cache_dir.clone(),
        enable_memory_cache: true,
        git_repo_substitution,
    };

    let input = open_input(args.file.as_deref())?;
    let output = BufWriter::new(std::io::stdout());
    Expander::default()
        .expand(credentials, input, output, &options)
        .await?;
    Ok(())
}

fn read_credentials(path: &Path) -> Result<Credentials> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::CredentialsOpen {
        path: path.display().to_string(),
        source,
    })?;
    Credentials::from_yaml(&text).map_err(|source| CliError::CredentialsRead {
        path: path.display().to_string(),
        source,
    })
}
