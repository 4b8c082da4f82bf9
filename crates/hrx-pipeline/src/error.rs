//! Expansion errors

use hrx_core::CoreError;
use hrx_repo::{ErrorCategory, RepoError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    // ============ Input Errors ============
    #[error("unable to read input documents")]
    Input(#[source] CoreError),

    #[error("invalid Helm release {namespace}/{name}: {message}")]
    InvalidRelease {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("missing chart repository for Helm release {namespace}/{name}")]
    MissingRepository { namespace: String, name: String },

    // ============ Chart Errors ============
    #[error("unable to load chart for {kind} {namespace}/{name}")]
    LoadChart {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: RepoError,
    },

    #[error("unable to render values for Helm release {namespace}/{name}")]
    Render {
        namespace: String,
        name: String,
        #[source]
        source: CoreError,
    },

    #[error("unable to parse manifest {key} from Helm release {namespace}/{name}")]
    Manifest {
        key: String,
        namespace: String,
        name: String,
        #[source]
        source: CoreError,
    },

    #[error("unable to expand Helm release {namespace}/{name}")]
    Release {
        namespace: String,
        name: String,
        #[source]
        source: Box<PipelineError>,
    },

    // ============ IO Errors ============
    #[error("unable to create a chart cache directory")]
    CacheDir(#[source] std::io::Error),

    #[error("unable to write output documents")]
    Output(#[source] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Category of the underlying chart source failure, if any
    pub fn repo_category(&self) -> Option<ErrorCategory> {
        match self {
            Self::LoadChart { source, .. } => Some(source.category()),
            Self::Release { source, .. } => source.repo_category(),
            _ => None,
        }
    }

    /// Whether the failure comes from malformed input rather than a fetch
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::Input(_) | Self::InvalidRelease { .. } | Self::MissingRepository { .. } => true,
            Self::Release { source, .. } => source.is_invalid_input(),
            other => other.repo_category() == Some(ErrorCategory::Config),
        }
    }
}
