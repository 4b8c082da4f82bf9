//! To-array command - turn a document stream into a single YAML sequence

use hrx_core::read_documents;
use serde_yaml::Value as YamlValue;
use std::io::{Read, Write};
use std::path::Path;

use crate::commands::open_input;
use crate::error::{CliError, Result};

pub fn run(file: Option<&Path>) -> Result<()> {
    let input = open_input(file)?;
    let stdout = std::io::stdout();
    convert(input, stdout.lock())
}

pub fn convert<R: Read, W: Write>(mut input: R, mut output: W) -> Result<()> {
    let mut text = String::new();
    input.read_to_string(&mut text)?;

    let documents = read_documents(&text).map_err(CliError::Documents)?;
    let sequence = YamlValue::Sequence(documents.iter().map(|node| node.value().clone()).collect());

    let yaml = serde_yaml::to_string(&sequence).map_err(std::io::Error::other)?;
    output.write_all(yaml.as_bytes())?;
    output.flush()?;
    Ok(())
}
