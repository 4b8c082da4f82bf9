//! CLI error types with exit code handling

use hrx_core::CoreError;
use hrx_pipeline::PipelineError;
use hrx_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid flag value
    #[error("{message}")]
    #[diagnostic(code(hrx::cli::usage))]
    Usage { message: String },

    #[error("invalid --kube-version value {value}")]
    #[diagnostic(code(hrx::cli::kube_version))]
    KubeVersion {
        value: String,
        #[source]
        source: CoreError,
    },

    #[error("unable to open credentials file {path}")]
    #[diagnostic(code(hrx::cli::credentials))]
    CredentialsOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to read credentials from {path}")]
    #[diagnostic(code(hrx::cli::credentials))]
    CredentialsRead {
        path: String,
        #[source]
        source: RepoError,
    },

    #[error("unable to open input file {path}")]
    #[diagnostic(code(hrx::cli::input))]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to read input documents")]
    #[diagnostic(code(hrx::cli::documents))]
    Documents(#[source] CoreError),

    #[error(transparent)]
    #[diagnostic(code(hrx::cli::expand))]
    Expand(#[from] PipelineError),

    #[error("IO error: {0}")]
    #[diagnostic(code(hrx::cli::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage { .. }
            | CliError::KubeVersion { .. }
            | CliError::CredentialsOpen { .. }
            | CliError::CredentialsRead { .. }
            | CliError::Input { .. }
            | CliError::Documents(_) => exit_codes::INVALID_INPUT,
            CliError::Expand(e) if e.is_invalid_input() => exit_codes::INVALID_INPUT,
            CliError::Expand(_) | CliError::Io(_) => exit_codes::ERROR,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::usage("bad flag").exit_code(), exit_codes::INVALID_INPUT);

        let missing = CliError::from(PipelineError::MissingRepository {
            namespace: "apps".to_string(),
            name: "web".to_string(),
        });
        assert_eq!(missing.exit_code(), exit_codes::INVALID_INPUT);
        assert_eq!(
            missing.to_string(),
            "missing chart repository for Helm release apps/web"
        );

        let io = CliError::from(std::io::Error::other("broken pipe"));
        assert_eq!(io.exit_code(), exit_codes::ERROR);
    }
}
