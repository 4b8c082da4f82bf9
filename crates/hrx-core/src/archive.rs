//! Chart archive reading and writing
//!
//! Charts travel as gzipped tarballs with a single top-level directory
//! named after the chart. Reading strips that directory so that the
//! resulting file names are relative to the chart root.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::Read;
use std::path::{Component, Path};
use tar::{Archive, Builder, Header};

use crate::error::{CoreError, Result};

/// A file belonging to a chart, addressed by its `/`-separated path
/// relative to the chart root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl ChartFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// File contents as text (lossy for non UTF-8 data)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Read every regular file from a chart archive
///
/// The leading directory component of each entry is dropped; entries that
/// would escape the chart root are rejected.
pub fn read_archive_files(data: &[u8]) -> Result<Vec<ChartFile>> {
    let decoder = GzDecoder::new(data);
    let mut archive = Archive::new(decoder);
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.into_owned();
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(CoreError::Archive {
                        message: format!("illegal path in archive: {}", path.display()),
                    });
                }
            }
        }

        // Drop the chart directory itself
        if parts.len() < 2 {
            continue;
        }
        let name = parts[1..].join("/");

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        files.push(ChartFile::new(name, content));
    }

    if files.is_empty() {
        return Err(CoreError::Archive {
            message: "archive contains no chart files".to_string(),
        });
    }

    Ok(files)
}

/// Build a gzipped tarball with every file placed under `root_dir/`
pub fn create_archive(root_dir: &str, files: &[ChartFile]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    for file in files {
        let mut header = Header::new_gnu();
        header.set_size(file.data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(
            &mut header,
            format!("{}/{}", root_dir, file.name),
            file.data.as_slice(),
        )?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Persist chart files below `dir`, creating directories as needed
pub fn save_files(files: &[ChartFile], dir: &Path) -> Result<()> {
    for file in files {
        let path = dir.join(&file.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &file.data)?;
    }
    Ok(())
}
