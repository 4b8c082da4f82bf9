//! Error types for chart source operations

use thiserror::Error;

/// Broad failure class of a [`RepoError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown repository kind or URL scheme, malformed constraint
    Config,
    /// Missing or rejected credentials
    Auth,
    /// No chart, version or tag matching the request
    NotFound,
    /// Clone, download or registry failure
    Transport,
    /// A cached chart could not be loaded or evicted
    CacheCorruption,
    Io,
}

/// Chart source errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("unknown kind {kind} for repository {namespace}/{name}")]
    UnknownRepositoryKind {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("unknown type for repository URL {url}")]
    UnknownUrlScheme { url: String },

    #[error("invalid repository URL {url}: {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("invalid repository {namespace}/{name}: {message}")]
    InvalidRepository {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("malformed version constraint '{constraint}': {message}")]
    InvalidConstraint { constraint: String, message: String },

    #[error("invalid git repo substitution {value}, expected <repo-url>#[<branch>#]<path>")]
    InvalidSubstitution { value: String },

    #[error("unable to access working copy path {path}: {source}")]
    WorkingCopyInaccessible {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("working copy path {path} is not a directory")]
    WorkingCopyNotDirectory { path: String },

    #[error(
        "dependency {dependency} of chart {parent} uses a relative repository, but {parent} does not come from a Git repository"
    )]
    RelativeDependencyWithoutCheckout { dependency: String, parent: String },

    // ============ Authentication Errors ============
    #[error("'{field}' is required")]
    MissingCredential { field: &'static str },

    #[error("authentication required for {url}")]
    AuthRequired { url: String },

    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    // ============ Not Found Errors ============
    #[error("chart {name} not found in repository {url}")]
    ChartNotInIndex { name: String, url: String },

    #[error("no version of chart {name} matches '{constraint}' (available: {available})")]
    UnsatisfiableConstraint {
        name: String,
        constraint: String,
        available: String,
    },

    #[error("chart {name}-{version} has no download URL")]
    MissingDownloadUrl { name: String, version: String },

    #[error("unable to locate any tags for {reference}")]
    NoTags { reference: String },

    #[error("unable to find version matching provided version spec '{constraint}'")]
    NoMatchingTag { constraint: String },

    // ============ Transport Errors ============
    #[error("request to {url} failed with status {status}")]
    HttpError { status: u16, url: String },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("unable to download index file for Helm repository {url}")]
    IndexDownload {
        url: String,
        #[source]
        source: Box<RepoError>,
    },

    #[error("invalid index format: {message}")]
    InvalidIndex { message: String },

    #[error("digest mismatch for {url}: expected {expected}, got {actual}")]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("unable to clone Git repository {url}")]
    Clone {
        url: String,
        #[source]
        source: Box<RepoError>,
    },

    #[error("git {command} failed: {message}")]
    GitCommand { command: String, message: String },

    #[error("OCI registry error: {message}")]
    OciError { message: String },

    #[error("invalid OCI reference: {reference}")]
    InvalidOciReference { reference: String },

    // ============ Cache Errors ============
    #[error("unable to evict corrupted cache entry {path}: {message}")]
    CacheCorrupted { path: String, message: String },

    // ============ Chart Errors ============
    #[error(transparent)]
    InvalidChart(#[from] hrx_core::CoreError),

    #[error("unable to load chart {chart} from {location}")]
    Chart {
        chart: String,
        location: String,
        #[source]
        source: Box<RepoError>,
    },

    #[error("unable to load chart {name}/{version} from {url} (a dependency of {parent})")]
    Dependency {
        name: String,
        version: String,
        url: String,
        parent: String,
        #[source]
        source: Box<RepoError>,
    },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for chart source operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Taxonomy class, looking through context wrappers
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownRepositoryKind { .. }
            | Self::UnknownUrlScheme { .. }
            | Self::InvalidRepositoryUrl { .. }
            | Self::InvalidRepository { .. }
            | Self::InvalidConstraint { .. }
            | Self::InvalidSubstitution { .. }
            | Self::WorkingCopyInaccessible { .. }
            | Self::WorkingCopyNotDirectory { .. }
            | Self::RelativeDependencyWithoutCheckout { .. }
            | Self::InvalidOciReference { .. } => ErrorCategory::Config,

            Self::MissingCredential { .. } | Self::AuthRequired { .. } | Self::AuthFailed { .. } => {
                ErrorCategory::Auth
            }

            Self::ChartNotInIndex { .. }
            | Self::UnsatisfiableConstraint { .. }
            | Self::MissingDownloadUrl { .. }
            | Self::NoTags { .. }
            | Self::NoMatchingTag { .. } => ErrorCategory::NotFound,

            Self::HttpError { status: 404, .. } => ErrorCategory::NotFound,
            Self::HttpError { .. }
            | Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::InvalidIndex { .. }
            | Self::DigestMismatch { .. }
            | Self::GitCommand { .. }
            | Self::OciError { .. } => ErrorCategory::Transport,

            Self::CacheCorrupted { .. } | Self::InvalidChart(_) => ErrorCategory::CacheCorruption,

            Self::IndexDownload { source, .. }
            | Self::Clone { source, .. }
            | Self::Chart { source, .. }
            | Self::Dependency { source, .. } => source.category(),

            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Io,
        }
    }

    /// Wrap with the chart and repository it concerns
    pub fn for_chart(self, chart: impl Into<String>, location: impl Into<String>) -> Self {
        Self::Chart {
            chart: chart.into(),
            location: location.into(),
            source: Box::new(self),
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout { seconds: 30 }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}
