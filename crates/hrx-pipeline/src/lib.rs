//! HelmRelease expansion for hrx
//!
//! Reads a stream of Kubernetes resources, finds the Flux `HelmRelease`
//! resources in it, resolves each release's chart through the repository
//! resource it references and appends the rendered manifests to the stream.
//!
//! ```rust,no_run
//! use hrx_pipeline::{ExpandOptions, Expander};
//! use hrx_repo::Credentials;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let expander = Expander::default();
//! let options = ExpandOptions {
//!     max_expansions: 3,
//!     ..Default::default()
//! };
//! expander
//!     .expand(Credentials::default(), std::io::stdin(), std::io::stdout(), &options)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod expander;
pub mod release;

pub use error::{PipelineError, Result};
pub use expander::{sort_nodes, ExpandOptions, Expander, ExpanderBuilder};
pub use release::{is_helm_release, HelmRelease, SourceRef, RELEASE_GROUP, RELEASE_KIND};
