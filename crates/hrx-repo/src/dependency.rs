//! Dependency resolution
//!
//! Every dependency declared in `Chart.yaml` is loaded through the same
//! [`ChartLoader`] and attached to the parent, replacing a bundled subchart
//! of the same name. Dependencies are resolved recursively by the loader
//! itself, so the returned tree is complete.

use hrx_core::{Chart, ChartDependency};

use crate::context::ChartContext;
use crate::error::{RepoError, Result};
use crate::loader::ChartLoader;
use crate::location::{join_chart_path, DependencySource};
use crate::source::RepositoryKind;

/// Load and attach every declared dependency of `chart`
///
/// `context` is the working copy `chart` was read from, if any. Relative
/// dependencies are only resolvable through it; without one, a relative
/// dependency must already be bundled.
pub(crate) async fn resolve_dependencies(
    loader: &ChartLoader,
    chart: &mut Chart,
    context: Option<&ChartContext>,
) -> Result<()> {
    let declared = chart.metadata.dependencies.clone();

    for dependency in &declared {
        let source = DependencySource::parse(&dependency.repository)
            .map_err(|e| dependency_error(dependency, chart, e))?;

        let loaded = match source {
            DependencySource::Bundled => {
                tracing::trace!(
                    chart = chart.name(),
                    dependency = %dependency.name,
                    "dependency is bundled"
                );
                continue;
            }
            DependencySource::Relative(path) => match context {
                Some(context) => {
                    let chart_path = join_chart_path(&context.chart_path, &path);
                    tracing::debug!(
                        chart = chart.name(),
                        dependency = %dependency.name,
                        path = %chart_path,
                        "loading dependency from the same working copy"
                    );
                    loader
                        .load(&context.source, &chart_path, &dependency.version, Some(context))
                        .await
                }
                None if chart.has_dependency(&dependency.name) => continue,
                None => {
                    return Err(RepoError::RelativeDependencyWithoutCheckout {
                        dependency: dependency.name.clone(),
                        parent: chart.name().to_string(),
                    });
                }
            },
            DependencySource::Remote(url) => {
                tracing::debug!(
                    chart = chart.name(),
                    dependency = %dependency.name,
                    repository = %url,
                    "loading dependency"
                );
                match RepositoryKind::from_url(&url) {
                    Ok(source) => {
                        loader
                            .load(&source, &dependency.name, &dependency.version, None)
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
        };

        let loaded = loaded.map_err(|e| dependency_error(dependency, chart, e))?;
        chart.add_dependency(loaded);
    }

    Ok(())
}

fn dependency_error(dependency: &ChartDependency, parent: &Chart, source: RepoError) -> RepoError {
    RepoError::Dependency {
        name: dependency.name.clone(),
        version: dependency.version.clone(),
        url: dependency.repository.clone(),
        parent: parent.name().to_string(),
        source: Box::new(source),
    }
}
