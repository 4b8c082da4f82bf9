//! Kubernetes-flavoured template filters
//!
//! Most filters are registered under both a lowercase name and the
//! camelCase name Helm charts use (`toyaml` / `toYaml`).

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use semver::{Version, VersionReq};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

/// Convert a value to YAML without the trailing newline
///
/// Usage: {{ Values.config | toYaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(String::new());
    }
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Usage: {{ Values.config | toJson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

/// Base64 encode a string
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Base64 decode a string
pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;
    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

fn as_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None if value.is_undefined() || value.is_none() => String::new(),
        None => value.to_string(),
    }
}

/// Quote a value with double quotes
#[must_use]
pub fn quote(value: Value) -> String {
    let s = as_text(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Quote a value with single quotes
#[must_use]
pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value).replace('\'', "''"))
}

/// Indent every non-empty line by `spaces`
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Like `indent` with a leading newline
///
/// Usage: {{ Values.data | toYaml | nindent(2) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Fail when the value is undefined, null or an empty string
///
/// Usage: {{ Values.name | required("name is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

/// Fall back to `default` when the value is empty
///
/// Usage: {{ Values.tag | default_if_empty(Chart.AppVersion) }}
pub fn default_if_empty(value: Value, default: Value) -> Value {
    if empty(value.clone()) { default } else { value }
}

/// Whether a value is undefined, null, or an empty string or collection
pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }
    match value.len() {
        Some(len) => len == 0,
        None => value.as_str().is_some_and(str::is_empty),
    }
}

/// SHA256 hex digest of a string
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate to at most `length` characters
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(prefix.as_str()).unwrap_or(&value).to_string()
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(suffix.as_str()).unwrap_or(&value).to_string()
}

/// Whether `version` satisfies `constraint`
///
/// Kubernetes-style versions such as `v1.28.3-gke.100` and constraints such
/// as `>=1.21.0-0` are accepted.
///
/// Usage: {% if Capabilities.KubeVersion.Version | semver_match(">=1.21.0-0") %}
pub fn semver_match(version: Value, constraint: String) -> Result<bool, Error> {
    let raw = version
        .as_str()
        .ok_or_else(|| invalid("version must be a string"))?;
    let parsed = parse_loose_version(raw)
        .ok_or_else(|| invalid(format!("invalid version: {}", raw)))?;

    let constraint = constraint.trim();
    let req = VersionReq::parse(constraint)
        .or_else(|_| {
            let base: String = constraint
                .split(',')
                .map(|part| part.trim().split('-').next().unwrap_or_default().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            VersionReq::parse(&base)
        })
        .map_err(|e| invalid(format!("invalid constraint '{}': {}", constraint, e)))?;

    Ok(req.matches(&parsed))
}

/// Parse `v1.28`, `1.28.3` or `1.28.3-gke.100` ignoring any suffix
fn parse_loose_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(trimmed) {
        if version.pre.is_empty() {
            return Some(version);
        }
    }
    let core = trimmed.split(['-', '+']).next()?;
    let mut parts = core.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    Some(Version::new(major, minor, patch))
}
