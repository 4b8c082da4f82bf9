//! Contract between the expansion pipeline and a chart renderer

use indexmap::IndexMap;

use crate::chart::Chart;
use crate::context::{Capabilities, ReleaseOptions};
use crate::error::Result;
use crate::values::Values;

/// Rendered output keyed by template path (`<chart>/templates/<file>`)
pub type Manifests = IndexMap<String, String>;

/// Turns a resolved chart plus release values into flat YAML text
///
/// Implementations own dependency processing and value coalescing; the
/// values passed in are the release's raw overrides.
pub trait ChartRenderer: Send + Sync {
    fn render(
        &self,
        chart: &Chart,
        values: &Values,
        release: &ReleaseOptions,
        capabilities: &Capabilities,
    ) -> Result<Manifests>;
}
