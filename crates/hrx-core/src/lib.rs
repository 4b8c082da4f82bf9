//! hrx core - shared types for chart resolution and release expansion
//!
//! - `Chart`: a loaded chart tree with its declared dependencies
//! - `Values`: configuration values with Helm-style coalescing
//! - `ResourceNode`: one Kubernetes resource document
//! - `ChartRenderer`: the rendering contract consumed by the pipeline

pub mod archive;
pub mod chart;
pub mod context;
pub mod error;
pub mod namespace;
pub mod render;
pub mod resource;
pub mod values;

pub use archive::ChartFile;
pub use chart::{Chart, ChartDependency, ChartMetadata};
pub use context::{Capabilities, KubeVersion, ReleaseOptions};
pub use error::{CoreError, Result};
pub use namespace::apply_namespace_if_unset;
pub use render::{ChartRenderer, Manifests};
pub use resource::{ResourceNode, read_documents, write_documents};
pub use values::Values;
