//! OCI registries
//!
//! Charts are pulled as Helm artifacts (`<registry>/<path>/<chart>:<tag>`).
//! Version constraints are resolved against the registry's tag list.
//! Registry access goes through [`RegistryClient`] so the pull logic can be
//! exercised without a registry.

use async_trait::async_trait;
use hrx_core::archive::read_archive_files;
use hrx_core::Chart;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use regex::Regex;
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::process::Command;
use url::Url;

use crate::cache::{self, ChartIdentity};
use crate::dependency::resolve_dependencies;
use crate::error::{RepoError, Result};
use crate::loader::ChartLoader;
use crate::location::parse_url;
use crate::source::{OciSource, RepositoryKind};
use crate::version::{is_exact_version, Constraint};

/// Media types of Helm charts stored in OCI registries
pub mod media_types {
    /// Helm chart config
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    /// Helm chart content layer
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
}

static ECR_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+[.]dkr[.]ecr[.][a-z0-9-]+[.]amazonaws[.]com$").expect("valid regex")
});

/// Registry operations needed to fetch a chart
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Use these credentials for every following request to `host`
    async fn login(&self, host: &str, username: &str, password: &str) -> Result<()>;

    /// Tags of `repository` (`host/path/chart`)
    async fn tags(&self, repository: &str) -> Result<Vec<String>>;

    /// Chart archive stored at `reference` (`host/path/chart:tag`)
    async fn pull_chart(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Creates one [`RegistryClient`] per chart load
#[async_trait]
pub trait RegistryClientFactory: Send + Sync {
    fn create(&self, insecure: bool) -> Result<Box<dyn RegistryClient>>;

    /// Registry password for Amazon ECR, from the `aws` CLI
    async fn ecr_password(&self, region: Option<&str>) -> Result<String> {
        let mut cmd = Command::new("aws");
        cmd.args(["ecr", "get-login-password"]);
        if let Some(region) = region {
            cmd.args(["--region", region]);
        }
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RepoError::AuthFailed {
                message: format!("unable to run aws ecr get-login-password: {}", e),
            })?;
        if !output.status.success() {
            return Err(RepoError::AuthFailed {
                message: format!(
                    "aws ecr get-login-password failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// [`RegistryClient`] backed by `oci-distribution`
pub struct OciDistributionClient {
    client: Client,
    credentials: Mutex<Option<(String, String)>>,
}

impl OciDistributionClient {
    pub fn new(insecure: bool) -> Self {
        let config = ClientConfig {
            protocol: if insecure {
                ClientProtocol::Http
            } else {
                ClientProtocol::Https
            },
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            credentials: Mutex::new(None),
        }
    }

    fn auth(&self) -> RegistryAuth {
        match &*self.credentials.lock().unwrap_or_else(PoisonError::into_inner) {
            Some((username, password)) => RegistryAuth::Basic(username.clone(), password.clone()),
            None => RegistryAuth::Anonymous,
        }
    }
}

#[async_trait]
impl RegistryClient for OciDistributionClient {
    async fn login(&self, host: &str, username: &str, password: &str) -> Result<()> {
        tracing::debug!(host = host, username = username, "logging in to OCI registry");
        *self.credentials.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((username.to_string(), password.to_string()));
        Ok(())
    }

    async fn tags(&self, repository: &str) -> Result<Vec<String>> {
        let reference = parse_reference(repository)?;
        let response = self
            .client
            .list_tags(&reference, &self.auth(), None, None)
            .await
            .map_err(|e| RepoError::OciError {
                message: format!("unable to list tags of {}: {}", repository, e),
            })?;
        Ok(response.tags)
    }

    async fn pull_chart(&self, reference: &str) -> Result<Vec<u8>> {
        let parsed = parse_reference(reference)?;
        let image = self
            .client
            .pull(
                &parsed,
                &self.auth(),
                vec![media_types::HELM_CONFIG, media_types::HELM_CONTENT],
            )
            .await
            .map_err(|e| RepoError::OciError {
                message: format!("unable to pull {}: {}", reference, e),
            })?;

        image
            .layers
            .into_iter()
            .find(|layer| layer.media_type == media_types::HELM_CONTENT)
            .map(|layer| layer.data)
            .ok_or_else(|| RepoError::OciError {
                message: format!("no chart content layer in {}", reference),
            })
    }
}

/// Factory for [`OciDistributionClient`]
#[derive(Debug, Default, Clone, Copy)]
pub struct OciDistributionFactory;

#[async_trait]
impl RegistryClientFactory for OciDistributionFactory {
    fn create(&self, insecure: bool) -> Result<Box<dyn RegistryClient>> {
        Ok(Box::new(OciDistributionClient::new(insecure)))
    }
}

/// Parse `host/path:tag`, with or without the `oci://` scheme
pub fn parse_reference(reference: &str) -> Result<Reference> {
    let clean = reference.trim_start_matches("oci://");
    Reference::try_from(clean).map_err(|e| RepoError::InvalidOciReference {
        reference: format!("{}: {}", reference, e),
    })
}

/// Whether `host` is an Amazon ECR registry
pub fn is_ecr_host(host: &str) -> bool {
    ECR_HOST.is_match(host)
}

/// Region of an ECR registry host (`<account>.dkr.ecr.<region>.amazonaws.com`)
fn ecr_region(host: &str) -> Option<&str> {
    is_ecr_host(host).then(|| host.split('.').nth(3)).flatten()
}

fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Load `chart_name` from an OCI registry
pub(crate) async fn load_chart(
    loader: &ChartLoader,
    source: &OciSource,
    chart_name: &str,
    version: &str,
) -> Result<Arc<Chart>> {
    load(loader, source, chart_name, version)
        .await
        .map_err(|e| e.for_chart(chart_name, RepositoryKind::Oci(source.clone()).to_string()))
}

async fn load(
    loader: &ChartLoader,
    source: &OciSource,
    chart_name: &str,
    version: &str,
) -> Result<Arc<Chart>> {
    let url = parse_url(&source.url)?;
    let host = host_with_port(&url);
    let repository = format!("{}{}/{}", host, url.path().trim_end_matches('/'), chart_name);

    let client = loader.registries().create(source.insecure)?;
    authenticate(loader, source, &url, &host, client.as_ref()).await?;

    let version = resolve_version(client.as_ref(), &repository, version).await?;

    let identity = ChartIdentity::new(source.url.as_str(), chart_name, [version.as_str()]);
    if let Some(chart) = loader.cache().get(&identity) {
        return Ok(chart);
    }

    let chart_dir = loader
        .cache()
        .repository_dir(&source.url, false)
        .join(format!("{}-{}", chart_name, version));

    let mut chart = match cache::load_from_disk(&chart_dir)? {
        Some(chart) => chart,
        None => {
            let reference = format!("{}:{}", repository, version);
            tracing::debug!(reference = %reference, "pulling chart from OCI registry");
            let data = client.pull_chart(&reference).await?;
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

/// Log in with configured credentials, or through the `aws` CLI for ECR
async fn authenticate(
    loader: &ChartLoader,
    source: &OciSource,
    url: &Url,
    host: &str,
    client: &dyn RegistryClient,
) -> Result<()> {
    let credentials = loader.credentials_for(url);
    if let Some(creds) = credentials
        .as_ref()
        .filter(|c| !c.username().is_empty() || !c.password().is_empty())
    {
        return client.login(host, creds.username(), creds.password()).await;
    }

    if is_ecr_host(host) || source.provider.as_deref() == Some("aws") {
        tracing::debug!(host = host, "fetching ECR login password");
        let password = loader.registries().ecr_password(ecr_region(host)).await?;
        return client.login(host, "AWS", &password).await;
    }
    Ok(())
}

/// Exact versions are used as-is; constraints pick the highest tag
async fn resolve_version(
    client: &dyn RegistryClient,
    repository: &str,
    version: &str,
) -> Result<String> {
    if is_exact_version(version) {
        return Ok(version.to_string());
    }
    let constraint = Constraint::parse(version)?;

    let tags = client.tags(repository).await?;
    if tags.is_empty() {
        return Err(RepoError::NoTags {
            reference: repository.to_string(),
        });
    }
    constraint
        .highest_match(tags.iter().map(String::as_str))
        .map(|(tag, _)| tag.to_string())
        .ok_or_else(|| RepoError::NoMatchingTag {
            constraint: constraint.to_string(),
        })
}
