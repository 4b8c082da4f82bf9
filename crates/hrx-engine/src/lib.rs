//! hrx engine - Jinja2 rendering of chart trees
//!
//! Templates see a Helm-shaped context (`Values`, `Release`, `Chart`,
//! `Capabilities`, `Template`) and Helm-named filters such as `toYaml`
//! and `nindent`.

pub mod dependencies;
pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;

pub use dependencies::{EnabledSubchart, enabled_subcharts};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
