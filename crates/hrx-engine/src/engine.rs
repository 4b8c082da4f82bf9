//! Chart renderer based on MiniJinja
//!
//! Every template of the chart tree is registered in one environment under
//! its output key, so a subchart's helpers can be imported from a parent
//! template. Keys follow Helm's layout:
//!
//! - `<chart>/templates/<file>` for the top-level chart
//! - `<chart>/charts/<subchart>/templates/<file>` for enabled subcharts

use hrx_core::{
    Capabilities, Chart, ChartRenderer, CoreError, Manifests, ReleaseOptions, Values,
};
use minijinja::Environment;
use serde::Serialize;

use crate::dependencies::enabled_subcharts;
use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions;

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: false }
    }

    /// Fail on undefined variables instead of rendering them empty
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    strict_mode: bool,
}

/// `Chart` object exposed to templates
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChartInfo<'a> {
    name: &'a str,
    version: &'a str,
    #[serde(rename = "APIVersion")]
    api_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(rename = "Type")]
    chart_type: &'a str,
}

impl<'a> From<&'a Chart> for ChartInfo<'a> {
    fn from(chart: &'a Chart) -> Self {
        let metadata = &chart.metadata;
        Self {
            name: &metadata.name,
            version: &metadata.version,
            api_version: &metadata.api_version,
            app_version: metadata.app_version.as_deref(),
            description: metadata.description.as_deref(),
            chart_type: metadata.chart_type.as_deref().unwrap_or("application"),
        }
    }
}

/// One chart of the tree with the values it renders with
struct RenderUnit<'a> {
    /// `<chart>` or `<parent>/charts/<scope>`
    prefix: String,
    chart: &'a Chart,
    values: Values,
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        }
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("toYaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("toJson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64enc", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("b64dec", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("empty", filters::empty);
        env.add_filter("default_if_empty", filters::default_if_empty);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("sha256sum", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimPrefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);
        env.add_filter("trimSuffix", filters::trimsuffix);
        env.add_filter("semver_match", filters::semver_match);
        env.add_filter("semverCompare", filters::semver_match);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("dig", functions::dig);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("tostring", functions::tostring);
        env.add_function("printf", functions::printf);
        env.add_function("tpl", functions::tpl);

        env
    }

    /// Render a chart tree with release overrides coalesced over its defaults
    pub fn render_chart(
        &self,
        chart: &Chart,
        values: &Values,
        release: &ReleaseOptions,
        capabilities: &Capabilities,
    ) -> Result<Manifests> {
        let mut units = Vec::new();
        collect_units(
            chart,
            chart.name().to_string(),
            Values::coalesce(&chart.values, values),
            &mut units,
        );

        let mut env = self.create_environment();
        for unit in &units {
            for template in &unit.chart.templates {
                let key = format!("{}/{}", unit.prefix, template.name);
                let source = template.text();
                env.add_template_owned(key.clone(), source.clone())
                    .map_err(|e| TemplateError::from_minijinja(e, &key, &source))?;
            }
        }

        let mut manifests = Manifests::new();
        for unit in &units {
            let chart_info = ChartInfo::from(unit.chart);
            let base_path = format!("{}/templates", unit.prefix);

            for template in &unit.chart.templates {
                if is_helper(&template.name) {
                    continue;
                }
                let key = format!("{}/{}", unit.prefix, template.name);
                let tmpl = env.get_template(&key).map_err(|e| {
                    TemplateError::from_minijinja(e, &key, &template.text())
                })?;

                let ctx = minijinja::context! {
                    Values => unit.values.inner(),
                    Release => release,
                    Chart => &chart_info,
                    Capabilities => capabilities,
                    Template => minijinja::context! {
                        Name => &key,
                        BasePath => &base_path,
                    },
                };

                let rendered = tmpl
                    .render(ctx)
                    .map_err(|e| TemplateError::from_minijinja(e, &key, &template.text()))?;
                tracing::trace!(template = %key, bytes = rendered.len(), "rendered template");
                manifests.insert(key, rendered);
            }
        }

        Ok(manifests)
    }
}

impl ChartRenderer for Engine {
    fn render(
        &self,
        chart: &Chart,
        values: &Values,
        release: &ReleaseOptions,
        capabilities: &Capabilities,
    ) -> hrx_core::Result<Manifests> {
        self.render_chart(chart, values, release, capabilities)
            .map_err(CoreError::from)
    }
}

/// Flatten the enabled chart tree, parents before their subcharts
fn collect_units<'a>(chart: &'a Chart, prefix: String, values: Values, units: &mut Vec<RenderUnit<'a>>) {
    let subcharts = enabled_subcharts(chart, &values);
    let sub_units: Vec<(String, &'a Chart, Values)> = subcharts
        .into_iter()
        .map(|sub| {
            (
                format!("{}/charts/{}", prefix, sub.scope_name),
                sub.chart,
                Values::for_subchart(&sub.chart.values, &values, sub.scope_name),
            )
        })
        .collect();

    units.push(RenderUnit {
        prefix,
        chart,
        values,
    });
    for (prefix, sub, values) in sub_units {
        collect_units(sub, prefix, values, units);
    }
}

/// Templates whose file name starts with `_` only define helpers
fn is_helper(name: &str) -> bool {
    name.rsplit('/')
        .next()
        .is_some_and(|file| file.starts_with('_'))
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        CoreError::Render(Box::new(err))
    }
}
