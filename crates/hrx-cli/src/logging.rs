//! Log setup; everything goes to stderr so stdout carries only documents

use tracing_subscriber::EnvFilter;

use crate::error::{CliError, Result};

const LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub fn parse_level(level: &str) -> Result<&str> {
    LEVELS
        .iter()
        .find(|candidate| **candidate == level)
        .copied()
        .ok_or_else(|| {
            CliError::usage(format!(
                "unable to parse --log-level value {} (must be one of: debug, info, warn, error)",
                level
            ))
        })
}

pub fn parse_format(format: &str) -> Result<LogFormat> {
    match format {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(CliError::usage(format!(
            "invalid --log-format value {} (valid values are text or json)",
            other
        ))),
    }
}

/// Install the global subscriber
///
/// `RUST_LOG`, when set, takes precedence over `--log-level`.
pub fn init(level: &str, format: &str) -> Result<()> {
    let level = parse_level(level)?;
    let format = parse_format(format)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    tracing::debug!("Finished initialization");
    Ok(())
}
