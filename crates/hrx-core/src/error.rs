//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart: {message}")]
    InvalidChart { message: String },

    #[error("Invalid chart archive: {message}")]
    Archive { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid Kubernetes version {version}: {message}")]
    InvalidKubeVersion { version: String, message: String },

    #[error("Invalid resource document: {message}")]
    InvalidDocument { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("{0}")]
    Render(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, CoreError>;
