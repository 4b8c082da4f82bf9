//! End-to-end expansion against fake chart sources

use async_trait::async_trait;
use hrx_core::archive::{create_archive, save_files, ChartFile};
use hrx_core::{read_documents, ResourceNode};
use hrx_pipeline::{ExpandOptions, Expander, PipelineError};
use hrx_repo::{
    CloneRequest, Credentials, GitClient, GitRepoSubstitution, RegistryClient,
    RegistryClientFactory,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIGMAP_TEMPLATE: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ Release.Name }}-configmap\ndata:{{ Values.data | toYaml | nindent(2) }}\n";

fn chart_files(name: &str, version: &str, extra_templates: &[(&str, &str)]) -> Vec<ChartFile> {
    let mut files = vec![
        ChartFile::new(
            "Chart.yaml",
            format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version),
        ),
        ChartFile::new("values.yaml", "data:\n  foo: bar\n"),
        ChartFile::new("templates/configmap.yaml", CONFIGMAP_TEMPLATE),
        ChartFile::new("templates/NOTES.txt", "Installed {{ Release.Name }}\n"),
    ];
    for (file, content) in extra_templates {
        files.push(ChartFile::new(format!("templates/{}", file), *content));
    }
    files
}

fn release(namespace: &str, name: &str, chart: &str, source_kind: &str, version: &str) -> String {
    format!(
        r#"apiVersion: helm.toolkit.fluxcd.io/v2
kind: HelmRelease
metadata:
  name: {name}
  namespace: {namespace}
spec:
  chart:
    spec:
      chart: {chart}
      version: "{version}"
      sourceRef:
        kind: {source_kind}
        name: test-repo
  values:
    data:
      foo: baz
"#
    )
}

async fn expand(expander: &Expander, input: &str, options: &ExpandOptions) -> Result<String, PipelineError> {
    expand_with(expander, Credentials::default(), input, options).await
}

async fn expand_with(
    expander: &Expander,
    credentials: Credentials,
    input: &str,
    options: &ExpandOptions,
) -> Result<String, PipelineError> {
    let mut output = Vec::new();
    expander
        .expand(credentials, input.as_bytes(), &mut output, options)
        .await?;
    Ok(String::from_utf8(output).unwrap())
}

fn find<'a>(nodes: &'a [ResourceNode], kind: &str, name: &str) -> Option<&'a ResourceNode> {
    nodes.iter().find(|n| n.kind() == kind && n.name() == name)
}

// ============ Helm repositories ============

/// Serve an index listing `charts` and their archives
async fn helm_repository(charts: &[Vec<ChartFile>]) -> MockServer {
    let server = MockServer::start().await;
    let mut index = String::from("apiVersion: v1\nentries:\n");

    for files in charts {
        let meta = ResourceNode::from_yaml(&String::from_utf8_lossy(&files[0].data)).unwrap();
        let (name, version) = (meta.get_str("name").unwrap(), meta.get_str("version").unwrap());
        index.push_str(&format!(
            "  {name}:\n  - name: {name}\n    version: {version}\n    urls: [charts/{name}-{version}.tgz]\n"
        ));
        Mock::given(method("GET"))
            .and(path(format!("/charts/{}-{}.tgz", name, version)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(create_archive(name, files).unwrap()))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index))
        .mount(&server)
        .await;
    server
}

fn helm_repository_node(url: &str) -> String {
    format!(
        "apiVersion: source.toolkit.fluxcd.io/v1\nkind: HelmRepository\nmetadata:\n  name: test-repo\n  namespace: testns\nspec:\n  url: {}\n",
        url
    )
}

#[tokio::test]
async fn test_expands_helm_release() {
    let server = helm_repository(&[chart_files("test-chart", "0.1.0", &[])]).await;
    let input = format!(
        "{}---\n{}",
        helm_repository_node(&server.uri()),
        release("testns", "test", "test-chart", "HelmRepository", ">=0.1.0")
    );

    let output = expand(&Expander::default(), &input, &ExpandOptions::default())
        .await
        .unwrap();
    assert!(output.contains("# Source: test-chart/templates/configmap.yaml"));
    assert!(!output.contains("Installed"));

    let nodes = read_documents(&output).unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].kind(), "HelmRepository");
    assert_eq!(nodes[1].kind(), "HelmRelease");

    let config_map = find(&nodes, "ConfigMap", "testns-test-configmap").unwrap();
    assert_eq!(config_map.namespace(), "testns");
    assert_eq!(config_map.get_str("data.foo"), Some("baz"));
}

#[tokio::test]
async fn test_target_namespace_and_release_name() {
    let server = helm_repository(&[chart_files("test-chart", "0.1.0", &[])]).await;
    let release = release("testns", "test", "test-chart", "HelmRepository", "0.1.0").replace(
        "spec:\n  chart:",
        "spec:\n  targetNamespace: apps\n  releaseName: web\n  chart:",
    );
    let input = format!("{}---\n{}", helm_repository_node(&server.uri()), release);

    let output = expand(&Expander::default(), &input, &ExpandOptions::default())
        .await
        .unwrap();
    let nodes = read_documents(&output).unwrap();
    let config_map = find(&nodes, "ConfigMap", "web-configmap").unwrap();
    // Rendered resources default to the release's namespace, not the target
    assert_eq!(config_map.namespace(), "testns");
}

#[tokio::test]
async fn test_nested_releases_follow_round_limit() {
    let nested = "apiVersion: helm.toolkit.fluxcd.io/v2\nkind: HelmRelease\nmetadata:\n  name: nested\nspec:\n  chart:\n    spec:\n      chart: leaf-chart\n      sourceRef:\n        kind: HelmRepository\n        name: test-repo\n";
    let server = helm_repository(&[
        chart_files("test-chart", "0.1.0", &[("release.yaml", nested)]),
        chart_files("leaf-chart", "1.0.0", &[]),
    ])
    .await;
    let input = format!(
        "{}---\n{}",
        helm_repository_node(&server.uri()),
        release("testns", "test", "test-chart", "HelmRepository", "")
    );

    let once = expand(&Expander::default(), &input, &ExpandOptions::default())
        .await
        .unwrap();
    let nodes = read_documents(&once).unwrap();
    let nested = find(&nodes, "HelmRelease", "nested").unwrap();
    assert_eq!(nested.namespace(), "testns");
    assert!(find(&nodes, "ConfigMap", "testns-nested-configmap").is_none());

    let options = ExpandOptions {
        max_expansions: 5,
        ..Default::default()
    };
    let full = expand(&Expander::default(), &input, &options).await.unwrap();
    let nodes = read_documents(&full).unwrap();
    assert!(find(&nodes, "ConfigMap", "testns-nested-configmap").is_some());
    // Each release is expanded exactly once across rounds
    assert_eq!(nodes.iter().filter(|n| n.kind() == "ConfigMap").count(), 2);
}

#[tokio::test]
async fn test_generated_resources_are_sorted() {
    let service = "apiVersion: v1\nkind: Service\nmetadata:\n  name: a-service\n";
    let deployment = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: z-deployment\n";
    let server = helm_repository(&[chart_files(
        "test-chart",
        "0.1.0",
        &[("a-service.yaml", service), ("b-deployment.yaml", deployment)],
    )])
    .await;
    let input = format!(
        "{}---\n{}",
        helm_repository_node(&server.uri()),
        release("testns", "test", "test-chart", "HelmRepository", "")
    );

    let output = expand(&Expander::default(), &input, &ExpandOptions::default())
        .await
        .unwrap();
    let kinds: Vec<String> = read_documents(&output)
        .unwrap()
        .iter()
        .skip(2)
        .map(|n| n.kind().to_string())
        .collect();
    assert_eq!(kinds, vec!["ConfigMap", "Deployment", "Service"]);
}

#[tokio::test]
async fn test_missing_repository() {
    let input = release("testns", "test", "test-chart", "HelmRepository", "");
    let err = expand(&Expander::default(), &input, &ExpandOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "unable to expand Helm release testns/test");
    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(
        source.to_string(),
        "missing chart repository for Helm release testns/test"
    );
    assert!(err.is_invalid_input());
}

#[tokio::test]
async fn test_chart_load_failure_names_repository() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let input = format!(
        "{}---\n{}",
        helm_repository_node(&server.uri()),
        release("testns", "test", "test-chart", "HelmRepository", "")
    );

    let err = expand(&Expander::default(), &input, &ExpandOptions::default())
        .await
        .unwrap_err();
    let PipelineError::Release { source, .. } = &err else {
        panic!("expected a release error, got {:?}", err);
    };
    assert_eq!(
        source.to_string(),
        "unable to load chart for HelmRepository testns/test-repo"
    );
    assert!(err.repo_category().is_some());
}

#[tokio::test]
async fn test_invalid_input_document() {
    let err = expand(&Expander::default(), "- just\n- a list\n", &ExpandOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Input(_)));
}

// ============ Git repositories ============

/// Writes a chart into each clone target and counts clones
#[derive(Default)]
struct FakeGit {
    clones: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

#[async_trait]
impl GitClient for FakeGit {
    async fn clone_repository(&self, request: &CloneRequest) -> hrx_repo::Result<()> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(request.url.clone());
        save_files(
            &chart_files("test-chart", "0.1.0", &[]),
            &request.target.join("charts/test-chart"),
        )?;
        Ok(())
    }
}

const GIT_URL: &str = "https://git.example.com/infra.git";

fn git_input(branch: &str) -> String {
    git_source_input(GIT_URL, &format!("branch: {}", branch), "./charts/test-chart")
}

fn git_source_input(url: &str, reference: &str, chart: &str) -> String {
    format!(
        "apiVersion: source.toolkit.fluxcd.io/v1\nkind: GitRepository\nmetadata:\n  name: test-repo\n  namespace: testns\nspec:\n  url: {}\n  ref:\n    {}\n---\n{}",
        url,
        reference,
        release("testns", "test", chart, "GitRepository", "")
    )
}

async fn expand_from_git(substitution: Option<&str>) -> (usize, String) {
    let working_copy = TempDir::new().unwrap();
    save_files(
        &chart_files("test-chart", "0.1.0", &[]),
        &working_copy.path().join("charts/test-chart"),
    )
    .unwrap();

    let git = Arc::new(FakeGit::default());
    let expander = Expander::builder().git_client(git.clone()).build();
    let options = ExpandOptions {
        git_repo_substitution: substitution.map(|value| {
            let value = format!("{}#{}", value, working_copy.path().display());
            GitRepoSubstitution::parse(&value).unwrap().unwrap()
        }),
        ..Default::default()
    };

    let output = expand(&expander, &git_input("main"), &options).await.unwrap();
    (git.clones.load(Ordering::SeqCst), output)
}

#[tokio::test]
async fn test_git_release_is_cloned() {
    let (clones, output) = expand_from_git(None).await;
    assert_eq!(clones, 1);

    let nodes = read_documents(&output).unwrap();
    assert!(find(&nodes, "ConfigMap", "testns-test-configmap").is_some());
}

#[tokio::test]
async fn test_git_substitution() {
    let cases = [
        (GIT_URL.to_string(), 0),
        (format!("{}#main", GIT_URL), 0),
        (format!("{}#other-branch", GIT_URL), 1),
        ("https://git.example.com/other.git".to_string(), 1),
    ];
    for (substitution, expected) in cases {
        let (clones, output) = expand_from_git(Some(&substitution)).await;
        assert_eq!(clones, expected, "substitution {}", substitution);
        assert!(output.contains("testns-test-configmap"));
    }
}

#[tokio::test]
async fn test_floating_checkouts_are_removed() {
    let cache = TempDir::new().unwrap();
    let git = Arc::new(FakeGit::default());
    let expander = Expander::builder().git_client(git.clone()).build();
    let options = ExpandOptions {
        chart_cache_dir: Some(cache.path().to_path_buf()),
        ..Default::default()
    };

    expand(&expander, &git_input("main"), &options).await.unwrap();
    assert_eq!(git.clones.load(Ordering::SeqCst), 1);
    assert!(!cache.path().join("ephemeral").exists());

    // A branch checkout is cloned again by the next invocation
    expand(&expander, &git_input("main"), &options).await.unwrap();
    assert_eq!(git.clones.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pinned_checkouts_are_reused() {
    let cache = TempDir::new().unwrap();
    let git = Arc::new(FakeGit::default());
    let expander = Expander::builder().git_client(git.clone()).build();
    let options = ExpandOptions {
        chart_cache_dir: Some(cache.path().to_path_buf()),
        ..Default::default()
    };
    let input = git_source_input(GIT_URL, "tag: v1.0.0", "./charts/test-chart");

    expand(&expander, &input, &options).await.unwrap();
    let output = expand(&expander, &input, &options).await.unwrap();

    assert_eq!(git.clones.load(Ordering::SeqCst), 1);
    assert!(cache
        .path()
        .join("https:##git.example.com#infra.git")
        .join("#v1.0.0###")
        .is_dir());
    assert!(output.contains("testns-test-configmap"));
}

#[tokio::test]
async fn test_failed_run_removes_floating_checkouts() {
    let cache = TempDir::new().unwrap();
    let git = Arc::new(FakeGit::default());
    let expander = Expander::builder().git_client(git.clone()).build();
    let options = ExpandOptions {
        chart_cache_dir: Some(cache.path().to_path_buf()),
        ..Default::default()
    };
    let input = git_source_input(GIT_URL, "branch: main", "./charts/missing-chart");

    let err = expand(&expander, &input, &options).await.unwrap_err();
    assert!(matches!(err, PipelineError::Release { .. }));
    assert_eq!(git.clones.load(Ordering::SeqCst), 1);
    assert!(!cache.path().join("ephemeral").exists());
}

const SSH_URL: &str = "ssh://git@git.example.com:2222/infra.git";

async fn cloned_urls(credentials: &str) -> Vec<String> {
    let git = Arc::new(FakeGit::default());
    let expander = Expander::builder().git_client(git.clone()).build();
    let credentials = Credentials::from_yaml(credentials).unwrap();
    let input = git_source_input(SSH_URL, "branch: main", "./charts/test-chart");

    expand_with(&expander, credentials, &input, &ExpandOptions::default())
        .await
        .unwrap();
    git.urls.lock().unwrap().clone()
}

#[tokio::test]
async fn test_ssh_with_password_clones_over_https() {
    let urls = cloned_urls("git.example.com:\n  credentials:\n    username: bot\n    password: secret\n").await;
    assert_eq!(urls, vec!["https://git.example.com/infra.git".to_string()]);
}

#[tokio::test]
async fn test_ssh_with_identity_stays_on_ssh() {
    let urls = cloned_urls(
        "git.example.com:\n  credentials:\n    identity: KEY\n    known_hosts: git.example.com ssh-ed25519 AAAA\n",
    )
    .await;
    assert_eq!(urls, vec![SSH_URL.to_string()]);
}

/// Leaves a partial working copy behind and fails
struct BrokenGit;

#[async_trait]
impl GitClient for BrokenGit {
    async fn clone_repository(&self, request: &CloneRequest) -> hrx_repo::Result<()> {
        std::fs::create_dir_all(&request.target)?;
        std::fs::write(request.target.join("partial"), "")?;
        Err(std::io::Error::other("connection reset").into())
    }
}

#[tokio::test]
async fn test_failed_clone_is_not_cached() {
    let cache = TempDir::new().unwrap();
    let options = ExpandOptions {
        chart_cache_dir: Some(cache.path().to_path_buf()),
        ..Default::default()
    };
    let input = git_source_input(GIT_URL, "tag: v1.0.0", "./charts/test-chart");
    let checkout = cache
        .path()
        .join("https:##git.example.com#infra.git")
        .join("#v1.0.0###");

    let broken = Expander::builder().git_client(Arc::new(BrokenGit)).build();
    assert!(expand(&broken, &input, &options).await.is_err());
    assert!(!checkout.exists());

    // The next run clones again instead of using the partial copy
    let git = Arc::new(FakeGit::default());
    let expander = Expander::builder().git_client(git.clone()).build();
    expand(&expander, &input, &options).await.unwrap();
    assert_eq!(git.clones.load(Ordering::SeqCst), 1);
}

// ============ OCI registries ============

#[derive(Default)]
struct FakeRegistryState {
    pulls: Mutex<Vec<String>>,
}

struct FakeRegistry(Arc<FakeRegistryState>);

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn login(&self, _host: &str, _username: &str, _password: &str) -> hrx_repo::Result<()> {
        Ok(())
    }

    async fn tags(&self, _repository: &str) -> hrx_repo::Result<Vec<String>> {
        Ok(vec!["0.1.0".to_string(), "0.1.1".to_string(), "0.2.0".to_string()])
    }

    async fn pull_chart(&self, reference: &str) -> hrx_repo::Result<Vec<u8>> {
        self.0.pulls.lock().unwrap().push(reference.to_string());
        let version = reference.rsplit(':').next().unwrap_or_default();
        Ok(create_archive("test-chart", &chart_files("test-chart", version, &[]))?)
    }
}

struct FakeFactory(Arc<FakeRegistryState>);

#[async_trait]
impl RegistryClientFactory for FakeFactory {
    fn create(&self, _insecure: bool) -> hrx_repo::Result<Box<dyn RegistryClient>> {
        Ok(Box::new(FakeRegistry(self.0.clone())))
    }
}

#[tokio::test]
async fn test_expands_from_oci_registry() {
    let state = Arc::new(FakeRegistryState::default());
    let expander = Expander::builder()
        .registry_clients(Arc::new(FakeFactory(state.clone())))
        .build();
    let input = format!(
        "apiVersion: source.toolkit.fluxcd.io/v1\nkind: HelmRepository\nmetadata:\n  name: test-repo\n  namespace: testns\nspec:\n  type: oci\n  url: oci://registry.example.com/charts\n---\n{}",
        release("testns", "test", "test-chart", "HelmRepository", "0.1.x")
    );

    let output = expand(&expander, &input, &ExpandOptions::default()).await.unwrap();
    assert_eq!(
        *state.pulls.lock().unwrap(),
        vec!["registry.example.com/charts/test-chart:0.1.1".to_string()]
    );
    let nodes = read_documents(&output).unwrap();
    assert!(find(&nodes, "ConfigMap", "testns-test-configmap").is_some());
}
