//! Subchart enablement
//!
//! Decides which dependencies of a chart take part in rendering and under
//! which name their values are scoped. Conditions and tags are evaluated
//! against the parent's coalesced values the same way Helm does:
//!
//! 1. `enabled: false` in Chart.yaml disables the dependency outright
//! 2. the first path in `condition` that resolves to a boolean decides
//! 3. otherwise the dependency is enabled if any of its tags is true, and
//!    disabled if all of its tags resolve to false
//! 4. otherwise it is enabled

use hrx_core::{Chart, ChartDependency, Values};
use serde_json::Value as JsonValue;

/// A subchart selected for rendering
#[derive(Debug, Clone, Copy)]
pub struct EnabledSubchart<'a> {
    /// Alias if set, otherwise the chart name
    pub scope_name: &'a str,
    pub chart: &'a Chart,
}

/// Subcharts of `chart` that should be rendered with `values`
pub fn enabled_subcharts<'a>(chart: &'a Chart, values: &Values) -> Vec<EnabledSubchart<'a>> {
    let mut selected = Vec::new();

    for declared in &chart.metadata.dependencies {
        let Some(subchart) = chart.dependency(&declared.name) else {
            tracing::warn!(
                chart = chart.name(),
                dependency = %declared.name,
                "dependency declared in Chart.yaml is not loaded, skipping"
            );
            continue;
        };
        if is_enabled(declared, values) {
            selected.push(EnabledSubchart {
                scope_name: declared.effective_name(),
                chart: subchart,
            });
        } else {
            tracing::debug!(
                chart = chart.name(),
                dependency = declared.effective_name(),
                "dependency disabled"
            );
        }
    }

    // Bundled subcharts that Chart.yaml does not mention are always rendered
    for subchart in &chart.dependencies {
        let declared = chart
            .metadata
            .dependencies
            .iter()
            .any(|d| d.name == subchart.name());
        if !declared {
            selected.push(EnabledSubchart {
                scope_name: subchart.name(),
                chart: subchart,
            });
        }
    }

    selected
}

fn is_enabled(dependency: &ChartDependency, values: &Values) -> bool {
    if dependency.enabled == Some(false) {
        return false;
    }

    if let Some(condition) = dependency.condition.as_deref() {
        let decided = condition
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .find_map(|path| values.get(path).and_then(JsonValue::as_bool));
        if let Some(enabled) = decided {
            return enabled;
        }
    }

    if !dependency.tags.is_empty() {
        let tag_values: Vec<bool> = dependency
            .tags
            .iter()
            .filter_map(|tag| values.get(&format!("tags.{}", tag)).and_then(JsonValue::as_bool))
            .collect();
        if tag_values.iter().any(|enabled| *enabled) {
            return true;
        }
        if !tag_values.is_empty() {
            return false;
        }
    }

    true
}
