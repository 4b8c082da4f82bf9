//! Git repositories
//!
//! Charts are read from a shallow checkout of the repository at the
//! requested reference. Checkouts are kept on disk per reference: pinned
//! references (commit, tag, semver) under the cache root, floating ones
//! (branches) under the ephemeral subtree.

use async_trait::async_trait;
use hrx_core::Chart;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use url::Url;

use crate::cache::ChartIdentity;
use crate::context::ChartContext;
use crate::credentials::{CredentialValues, HttpAuth};
use crate::dependency::resolve_dependencies;
use crate::error::{RepoError, Result};
use crate::loader::ChartLoader;
use crate::location::parse_url;
use crate::source::{GitSource, RepositoryKind};
use crate::version::Constraint;

/// Branch used when a GitRepository sets no reference at all
pub const DEFAULT_BRANCH: &str = "master";

/// `spec.ref` of a GitRepository
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GitReference {
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub semver: String,
    /// Full ref name such as `refs/pull/42/head`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub commit: String,
}

impl GitReference {
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            branch: name.into(),
            ..Default::default()
        }
    }

    /// `{branch: master}` when nothing is set, otherwise unchanged
    pub fn normalized(self) -> Self {
        if self.slots().iter().all(|slot| slot.is_empty()) {
            Self::branch(DEFAULT_BRANCH)
        } else {
            self
        }
    }

    /// Whether the reference denotes an immutable revision
    pub fn is_pinned(&self) -> bool {
        !self.commit.is_empty() || !self.tag.is_empty() || !self.semver.is_empty()
    }

    /// Branch, tag, semver, name and commit, in that order
    pub fn slots(&self) -> [&str; 5] {
        [
            self.branch.as_str(),
            self.tag.as_str(),
            self.semver.as_str(),
            self.name.as_str(),
            self.commit.as_str(),
        ]
    }

    /// Directory of a checkout at this reference, below the repository dir
    pub fn dir_name(&self) -> String {
        self.slots().join("#")
    }

    /// What to check out, most specific reference first
    pub fn checkout(&self) -> Checkout {
        if !self.commit.is_empty() {
            Checkout::Commit(self.commit.clone())
        } else if !self.name.is_empty() {
            Checkout::RefName(self.name.clone())
        } else if !self.semver.is_empty() {
            Checkout::SemVer(self.semver.clone())
        } else if !self.tag.is_empty() {
            Checkout::Tag(self.tag.clone())
        } else {
            Checkout::Branch(self.branch.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkout {
    Branch(String),
    Tag(String),
    /// Highest remote tag satisfying the constraint
    SemVer(String),
    RefName(String),
    Commit(String),
}

/// Material needed to authenticate a clone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitAuth {
    pub ssh: Option<SshAuth>,
    pub http: Option<HttpAuth>,
    pub ca_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshAuth {
    pub identity: String,
    pub known_hosts: String,
}

impl GitAuth {
    /// Auth options for cloning `url`
    ///
    /// SSH remotes need both `identity` and `known_hosts`.
    pub fn for_url(url: &Url, credentials: Option<&CredentialValues>) -> Result<Self> {
        let empty = CredentialValues::default();
        let credentials = credentials.unwrap_or(&empty);

        if url.scheme() == "ssh" {
            let identity = credentials.require("identity")?.to_string();
            let known_hosts = credentials.require("known_hosts")?.to_string();
            return Ok(Self {
                ssh: Some(SshAuth {
                    identity,
                    known_hosts,
                }),
                ..Default::default()
            });
        }

        Ok(Self {
            ssh: None,
            http: credentials.http_auth(),
            ca_file: credentials.ca_file.clone().filter(|f| !f.is_empty()),
        })
    }
}

/// One clone operation
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub url: String,
    pub checkout: Checkout,
    pub auth: GitAuth,
    pub timeout: Duration,
    /// Directory to create the working copy in
    pub target: PathBuf,
}

/// Clones repositories
#[async_trait]
pub trait GitClient: Send + Sync {
    async fn clone_repository(&self, request: &CloneRequest) -> Result<()>;
}

/// [`GitClient`] driving the `git` executable
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: String,
}

impl Default for SystemGit {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl SystemGit {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[String], env: &[(String, String)], dir: Option<&Path>) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let command = args
            .iter()
            .find(|arg| !arg.starts_with('-') && !arg.contains('='))
            .cloned()
            .unwrap_or_default();
        tracing::debug!(target: "git", command = %command, "executing git");

        let output = cmd.output().await.map_err(|e| RepoError::GitCommand {
            command: command.clone(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepoError::GitCommand {
                command,
                message: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn clone_inner(&self, request: &CloneRequest) -> Result<()> {
        // Keeps the key material alive until git exits
        let scratch = tempfile::TempDir::new()?;
        let (config, env) = auth_settings(&request.auth, scratch.path())?;

        match &request.checkout {
            Checkout::Branch(reference) | Checkout::Tag(reference) => {
                self.shallow_clone(&config, &env, &request.url, reference, &request.target)
                    .await
            }
            Checkout::SemVer(constraint) => {
                let tag = self.resolve_semver(&config, &env, &request.url, constraint).await?;
                self.shallow_clone(&config, &env, &request.url, &tag, &request.target)
                    .await
            }
            Checkout::RefName(reference) | Checkout::Commit(reference) => {
                std::fs::create_dir_all(&request.target)?;
                let target = Some(request.target.as_path());
                self.run(&strings(&["init", "--quiet"]), &env, target).await?;
                self.run(
                    &strings(&["remote", "add", "origin", request.url.as_str()]),
                    &env,
                    target,
                )
                .await?;
                let mut fetch = config.clone();
                fetch.extend(strings(&["fetch", "--depth=1", "origin", reference.as_str()]));
                self.run(&fetch, &env, target).await?;
                self.run(
                    &strings(&["checkout", "--quiet", "--detach", "FETCH_HEAD"]),
                    &env,
                    target,
                )
                .await?;
                Ok(())
            }
        }
    }

    async fn shallow_clone(
        &self,
        config: &[String],
        env: &[(String, String)],
        url: &str,
        reference: &str,
        target: &Path,
    ) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut args = config.to_vec();
        args.extend(strings(&[
            "clone",
            "--quiet",
            "--depth=1",
            "--single-branch",
            "--branch",
            reference,
            url,
        ]));
        args.push(target.display().to_string());
        self.run(&args, env, None).await.map(|_| ())
    }

    async fn resolve_semver(
        &self,
        config: &[String],
        env: &[(String, String)],
        url: &str,
        constraint: &str,
    ) -> Result<String> {
        let mut args = config.to_vec();
        args.extend(strings(&["ls-remote", "--tags", url]));
        let output = self.run(&args, env, None).await?;
        let tags = parse_remote_tags(&output);

        let constraint = Constraint::parse(constraint)?;
        constraint
            .highest_match(tags.iter().map(String::as_str))
            .map(|(tag, _)| tag.to_string())
            .ok_or_else(|| RepoError::NoMatchingTag {
                constraint: constraint.to_string(),
            })
    }
}

#[async_trait]
impl GitClient for SystemGit {
    async fn clone_repository(&self, request: &CloneRequest) -> Result<()> {
        match tokio::time::timeout(request.timeout, self.clone_inner(request)).await {
            Ok(result) => result,
            Err(_) => Err(RepoError::Timeout {
                seconds: request.timeout.as_secs(),
            }),
        }
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// `-c` options and environment carrying the auth material
fn auth_settings(auth: &GitAuth, scratch: &Path) -> Result<(Vec<String>, Vec<(String, String)>)> {
    let mut config = Vec::new();
    let mut env = Vec::new();

    if let Some(ssh) = &auth.ssh {
        let key = scratch.join("identity");
        let known_hosts = scratch.join("known_hosts");
        write_private(&key, &ssh.identity)?;
        write_private(&known_hosts, &ssh.known_hosts)?;
        env.push((
            "GIT_SSH_COMMAND".to_string(),
            format!(
                "ssh -i '{}' -o IdentitiesOnly=yes -o UserKnownHostsFile='{}' -o StrictHostKeyChecking=yes",
                key.display(),
                known_hosts.display()
            ),
        ));
    }
    if let Some(http) = &auth.http {
        config.push("-c".to_string());
        config.push(format!("http.extraHeader=Authorization: {}", http.header_value()));
    }
    if let Some(ca_file) = &auth.ca_file {
        config.push("-c".to_string());
        config.push(format!("http.sslCAInfo={}", ca_file));
    }
    Ok((config, env))
}

fn write_private(path: &Path, content: &str) -> Result<()> {
    let mut content = content.to_string();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(content.as_bytes())?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, content)?;
    }
    Ok(())
}

/// Tag names from `git ls-remote --tags` output
pub fn parse_remote_tags(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .filter_map(|reference| reference.strip_prefix("refs/tags/"))
        .filter(|tag| !tag.ends_with("^{}"))
        .map(str::to_string)
        .collect()
}

/// A local working copy standing in for a remote repository
///
/// Written as `<repo-url>#[<branch>#]<path>`. Without a branch it applies to
/// every reference of the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepoSubstitution {
    pub url: String,
    pub branch: Option<String>,
    pub path: PathBuf,
}

impl GitRepoSubstitution {
    /// Parse a substitution; an empty string means none
    pub fn parse(value: &str) -> Result<Option<Self>> {
        if value.is_empty() {
            return Ok(None);
        }
        let invalid = || RepoError::InvalidSubstitution {
            value: value.to_string(),
        };

        let parts: Vec<&str> = value.split('#').collect();
        let (url, branch, path) = match parts.as_slice() {
            [url, path] => (*url, None, *path),
            [url, branch, path] => (*url, Some(branch.to_string()), *path),
            _ => return Err(invalid()),
        };
        if url.is_empty() || path.is_empty() || branch.as_deref() == Some("") {
            return Err(invalid());
        }

        let metadata = std::fs::metadata(path).map_err(|source| RepoError::WorkingCopyInaccessible {
            path: path.to_string(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(RepoError::WorkingCopyNotDirectory {
                path: path.to_string(),
            });
        }

        Ok(Some(Self {
            url: url.to_string(),
            branch,
            path: PathBuf::from(path),
        }))
    }

    pub fn applies_to(&self, url: &str, reference: &GitReference) -> bool {
        self.url == url
            && self
                .branch
                .as_deref()
                .is_none_or(|branch| branch == reference.branch)
    }
}

/// Load `chart_name` from a Git source
///
/// With a parent context the parent's working copy is reused; no clone
/// happens.
pub(crate) async fn load_chart(
    loader: &ChartLoader,
    source: &GitSource,
    chart_name: &str,
    parent: Option<&ChartContext>,
) -> Result<Arc<Chart>> {
    let identity = ChartIdentity::new(source.url.as_str(), chart_name, source.reference.slots());
    if let Some(chart) = loader.cache().get(&identity) {
        return Ok(chart);
    }
    tracing::debug!(url = %source.url, chart = chart_name, "loading chart from Git repository");

    let checkout = match parent {
        Some(context) => context.checkout.clone(),
        None => match loader
            .git_substitution()
            .filter(|s| s.applies_to(&source.url, &source.reference))
        {
            Some(substitution) => {
                tracing::debug!(
                    url = %source.url,
                    path = %substitution.path.display(),
                    "using working copy instead of cloning"
                );
                substitution.path.clone()
            }
            None => checkout_repository(loader, source).await?,
        },
    };

    let mut chart = Chart::load_dir(checkout.join(chart_name))
        .map_err(|e| RepoError::from(e).for_chart(chart_name, RepositoryKind::Git(source.clone()).to_string()))?;

    let context = ChartContext {
        checkout,
        chart_path: chart_name.to_string(),
        source: RepositoryKind::Git(source.clone()),
    };
    resolve_dependencies(loader, &mut chart, Some(&context)).await?;

    let chart = Arc::new(chart);
    loader.cache().insert(identity, chart.clone());
    Ok(chart)
}

/// Working copy of `source`, cloning it unless already on disk
async fn checkout_repository(loader: &ChartLoader, source: &GitSource) -> Result<PathBuf> {
    let reference = &source.reference;
    let repo_path = loader
        .cache()
        .repository_dir(&source.url, !reference.is_pinned())
        .join(reference.dir_name());

    if repo_path.is_dir() {
        tracing::debug!(url = %source.url, path = %repo_path.display(), "using cached Git repository");
        return Ok(repo_path);
    }

    let mut url = parse_url(&source.url)?;
    let credentials = loader.credentials_for(&url);

    if let Some(creds) = &credentials {
        if url.scheme() == "ssh" && !creds.password().is_empty() && creds.identity().is_empty() {
            url = https_equivalent(&url)?;
            tracing::debug!(url = %url, "cloning over HTTPS with password credentials");
        }
    }
    let auth = GitAuth::for_url(&url, credentials.as_ref()).map_err(|e| clone_error(&url, e))?;

    let request = CloneRequest {
        url: url.to_string(),
        checkout: reference.checkout(),
        auth,
        timeout: source.timeout,
        target: repo_path.clone(),
    };

    let started = Instant::now();
    if let Err(e) = loader.git_client().clone_repository(&request).await {
        if repo_path.exists() {
            if let Err(cleanup) = std::fs::remove_dir_all(&repo_path) {
                tracing::warn!(
                    path = %repo_path.display(),
                    error = %cleanup,
                    "unable to remove partial clone"
                );
            }
        }
        return Err(clone_error(&url, e));
    }
    tracing::debug!(
        url = %request.url,
        duration = ?started.elapsed(),
        "cloned Git repository"
    );
    Ok(repo_path)
}

fn clone_error(url: &Url, source: RepoError) -> RepoError {
    RepoError::Clone {
        url: url.to_string(),
        source: Box::new(source),
    }
}

/// `ssh://user@host:port/path` -> `https://host/path`
fn https_equivalent(url: &Url) -> Result<Url> {
    let host = url.host_str().unwrap_or_default();
    parse_url(&format!("https://{}{}", host, url.path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_reference_defaults_to_master() {
        let reference = GitReference::default().normalized();
        assert_eq!(reference, GitReference::branch("master"));
        assert_eq!(reference.dir_name(), "master####");
        assert!(!reference.is_pinned());

        let tagged = GitReference {
            tag: "v1.0.0".to_string(),
            ..Default::default()
        }
        .normalized();
        assert_eq!(tagged.dir_name(), "#v1.0.0###");
        assert!(tagged.is_pinned());
    }

    #[test]
    fn test_checkout_precedence() {
        let reference = GitReference {
            branch: "main".to_string(),
            tag: "v1".to_string(),
            commit: "abc123".to_string(),
            ..Default::default()
        };
        assert_eq!(reference.checkout(), Checkout::Commit("abc123".to_string()));
        assert_eq!(
            GitReference::branch("main").checkout(),
            Checkout::Branch("main".to_string())
        );
    }

    #[test]
    fn test_ssh_auth_requires_identity_and_known_hosts() {
        let url = Url::parse("ssh://git@example.com/org/repo.git").unwrap();
        let err = GitAuth::for_url(&url, None).unwrap_err();
        assert_eq!(err.to_string(), "'identity' is required");

        let only_key = CredentialValues {
            identity: Some("KEY".to_string()),
            ..Default::default()
        };
        let err = GitAuth::for_url(&url, Some(&only_key)).unwrap_err();
        assert_eq!(err.to_string(), "'known_hosts' is required");
    }

    #[test]
    fn test_https_auth() {
        let url = Url::parse("https://example.com/org/repo.git").unwrap();
        let creds = CredentialValues {
            username: Some("bot".to_string()),
            password: Some("token".to_string()),
            ..Default::default()
        };
        let auth = GitAuth::for_url(&url, Some(&creds)).unwrap();
        assert!(auth.ssh.is_none());
        assert!(matches!(auth.http, Some(HttpAuth::Basic { .. })));
        assert_eq!(GitAuth::for_url(&url, None).unwrap(), GitAuth::default());
    }

    #[test]
    fn test_https_equivalent() {
        let url = Url::parse("ssh://git@example.com:2222/org/repo.git").unwrap();
        assert_eq!(
            https_equivalent(&url).unwrap().as_str(),
            "https://example.com/org/repo.git"
        );
    }

    #[test]
    fn test_parse_remote_tags() {
        let output = "abc\trefs/tags/v1.0.0\nabd\trefs/tags/v1.0.0^{}\nabe\trefs/heads/main\nabf\trefs/tags/v1.2.0\n";
        assert_eq!(parse_remote_tags(output), vec!["v1.0.0", "v1.2.0"]);
    }

    #[test]
    fn test_parse_substitution() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().display().to_string();
        let url = "ssh://git@localhost/repo.git";

        let plain = GitRepoSubstitution::parse(&format!("{}#{}", url, path))
            .unwrap()
            .unwrap();
        assert_eq!(plain.url, url);
        assert_eq!(plain.branch, None);
        assert_eq!(plain.path, dir.path());

        let branched = GitRepoSubstitution::parse(&format!("{}#trunk#{}", url, path))
            .unwrap()
            .unwrap();
        assert_eq!(branched.branch.as_deref(), Some("trunk"));

        assert!(GitRepoSubstitution::parse("").unwrap().is_none());
    }

    #[test]
    fn test_parse_substitution_errors() {
        let err = GitRepoSubstitution::parse("invalid-substitution").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid git repo substitution invalid-substitution, expected <repo-url>#[<branch>#]<path>"
        );

        let err = GitRepoSubstitution::parse("ssh://git@localhost/repo.git#/non/existent/dir")
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("unable to access working copy path /non/existent/dir: "));

        let file = tempfile::NamedTempFile::new().unwrap();
        let file_path = file.path().display().to_string();
        let err = GitRepoSubstitution::parse(&format!("ssh://git@localhost/repo.git#{}", file_path))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("working copy path {} is not a directory", file_path)
        );
    }

    #[test]
    fn test_substitution_matching() {
        let substitution = GitRepoSubstitution {
            url: "ssh://git@localhost/dummy.git".to_string(),
            branch: None,
            path: PathBuf::from("/work"),
        };
        let main = GitReference::branch("main");
        assert!(substitution.applies_to("ssh://git@localhost/dummy.git", &main));
        assert!(!substitution.applies_to("ssh://git@localhost/other.git", &main));

        let trunk_only = GitRepoSubstitution {
            branch: Some("trunk".to_string()),
            ..substitution
        };
        assert!(trunk_only.applies_to("ssh://git@localhost/dummy.git", &GitReference::branch("trunk")));
        assert!(!trunk_only.applies_to("ssh://git@localhost/dummy.git", &main));
    }
}
