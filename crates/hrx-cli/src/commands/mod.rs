//! Subcommand implementations

pub mod expand;
pub mod to_array;
pub mod version;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{CliError, Result};

/// The named file, or stdin when none is given or it is `-`
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path).map_err(|source| CliError::Input {
                path: path.display().to_string(),
                source,
            })?;
            Ok(Box::new(file))
        }
        _ => Ok(Box::new(std::io::stdin())),
    }
}
