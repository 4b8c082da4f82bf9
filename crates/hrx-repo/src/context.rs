//! Where a loaded chart lives

use std::path::PathBuf;

use crate::source::RepositoryKind;

/// Location of a chart loaded from a working copy
///
/// Passed down to dependency resolution so charts referenced by a relative
/// path (`file://../common`) are read from the same working copy, through
/// the same source, instead of being fetched again.
#[derive(Debug, Clone)]
pub struct ChartContext {
    /// Root of the working copy
    pub checkout: PathBuf,
    /// Path of the chart inside the working copy
    pub chart_path: String,
    /// Source the working copy belongs to
    pub source: RepositoryKind,
}
