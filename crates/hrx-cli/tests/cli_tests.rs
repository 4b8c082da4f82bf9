//! Integration tests for the hrx binary

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Run hrx with `stdin` piped in
fn hrx(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_hrx"))
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute hrx");
    // hrx may exit before reading its input
    let _ = child.stdin.take().unwrap().write_all(stdin.as_bytes());
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const CONFIG_MAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: plain\n  namespace: default\ndata:\n  key: value\n";

/// Working copy with a chart at `charts/test-chart`
fn working_copy() -> TempDir {
    let dir = TempDir::new().unwrap();
    let chart = dir.path().join("charts/test-chart");
    std::fs::create_dir_all(chart.join("templates")).unwrap();
    std::fs::write(
        chart.join("Chart.yaml"),
        "apiVersion: v2\nname: test-chart\nversion: 0.1.0\n",
    )
    .unwrap();
    std::fs::write(chart.join("values.yaml"), "data: {}\n").unwrap();
    std::fs::write(
        chart.join("templates/configmap.yaml"),
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ Release.Name }}-configmap\ndata:{{ Values.data | toYaml | nindent(2) }}\n",
    )
    .unwrap();
    dir
}

const GIT_URL: &str = "https://git.example.com/infra.git";

fn git_release_input() -> String {
    format!(
        r#"apiVersion: source.toolkit.fluxcd.io/v1
kind: GitRepository
metadata:
  name: infra
  namespace: testns
spec:
  url: {GIT_URL}
  ref:
    branch: main
---
apiVersion: helm.toolkit.fluxcd.io/v2
kind: HelmRelease
metadata:
  name: test
  namespace: testns
spec:
  chart:
    spec:
      chart: ./charts/test-chart
      sourceRef:
        kind: GitRepository
        name: infra
  values:
    data:
      foo: baz
"#
    )
}

fn substitution(dir: &Path) -> String {
    format!("{}#{}", GIT_URL, dir.display())
}

mod expand_command {
    use super::*;

    #[test]
    fn test_passes_plain_documents_through() {
        let output = hrx(&[], CONFIG_MAP);
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert_eq!(stdout(&output), CONFIG_MAP);
    }

    #[test]
    fn test_expands_from_working_copy() {
        let dir = working_copy();
        let input_dir = TempDir::new().unwrap();
        let input = input_dir.path().join("input.yaml");
        std::fs::write(&input, git_release_input()).unwrap();

        let output = hrx(
            &[
                "expand",
                "--git-repo-substitution",
                &substitution(dir.path()),
                input.to_str().unwrap(),
            ],
            "",
        );
        assert!(output.status.success(), "stderr: {}", stderr(&output));

        let out = stdout(&output);
        assert!(out.contains("# Source: test-chart/templates/configmap.yaml"));
        assert!(out.contains("name: testns-test-configmap"));
        assert!(out.contains("foo: baz"));
    }

    #[test]
    fn test_default_command_reads_stdin() {
        let dir = working_copy();
        let output = hrx(
            &["--git-repo-substitution", &substitution(dir.path())],
            &git_release_input(),
        );
        assert!(output.status.success(), "stderr: {}", stderr(&output));
        assert!(stdout(&output).contains("name: testns-test-configmap"));
    }

    #[test]
    fn test_info_logs_go_to_stderr() {
        let output = hrx(&["--log-level", "info", "expand"], CONFIG_MAP);
        assert!(output.status.success());
        assert!(stderr(&output).contains("Starting expand command"));
        assert!(stderr(&output).contains("Finished expand command"));
        assert_eq!(stdout(&output), CONFIG_MAP);
    }

    #[test]
    fn test_missing_repository_is_invalid_input() {
        let input = git_release_input();
        let release = input.split("---\n").nth(1).unwrap();
        let output = hrx(&["expand"], release);

        assert_eq!(output.status.code(), Some(2));
        let err = stderr(&output);
        assert!(err.contains("unable to expand Helm release testns/test"));
        assert!(err.contains("missing chart repository for Helm release testns/test"));
    }

    #[test]
    fn test_invalid_kube_version() {
        let output = hrx(&["expand", "--kube-version", "latest"], CONFIG_MAP);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("invalid --kube-version value latest"));
    }

    #[test]
    fn test_missing_credentials_file() {
        let output = hrx(
            &["expand", "--credentials-file", "/nonexistent/credentials.yaml"],
            CONFIG_MAP,
        );
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("unable to open credentials file"));
    }

    #[test]
    fn test_invalid_substitution() {
        let output = hrx(&["expand", "--git-repo-substitution", "nohash"], CONFIG_MAP);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("invalid git repo substitution nohash"));
    }
}

mod logging_flags {
    use super::*;

    #[test]
    fn test_invalid_log_level() {
        let output = hrx(&["--log-level", "verbose"], CONFIG_MAP);
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("unable to parse --log-level value verbose"));
    }

    #[test]
    fn test_invalid_log_format() {
        let output = hrx(&["--log-format", "xml", "version"], "");
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("invalid --log-format value xml"));
    }

    #[test]
    fn test_json_logs() {
        let output = hrx(&["--log-level", "info", "--log-format", "json"], CONFIG_MAP);
        assert!(output.status.success());
        let first = stderr(&output).lines().next().unwrap_or_default().to_string();
        assert!(first.starts_with('{'), "not JSON: {}", first);
    }
}

mod other_commands {
    use super::*;

    #[test]
    fn test_to_array() {
        let input = format!("{}---\nkind: Secret\nmetadata:\n  name: b\n", CONFIG_MAP);
        let output = hrx(&["to-array"], &input);
        assert!(output.status.success(), "stderr: {}", stderr(&output));

        let value: serde_yaml::Value = serde_yaml::from_str(&stdout(&output)).unwrap();
        let items = value.as_sequence().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["metadata"]["name"], "plain");
    }

    #[test]
    fn test_version() {
        let output = hrx(&["version"], "");
        assert!(output.status.success());
        assert_eq!(
            stdout(&output).trim(),
            format!("hrx {}", env!("CARGO_PKG_VERSION"))
        );
    }
}
