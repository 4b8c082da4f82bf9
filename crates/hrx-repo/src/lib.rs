//! Chart sources for hrx
//!
//! This crate resolves a chart reference to a fully loaded chart tree:
//!
//! - **Git repositories**: shallow checkouts at a branch, tag, semver
//!   range, ref name or commit, with local working-copy substitution
//! - **Helm repositories**: `index.yaml` lookup with version constraints
//! - **OCI registries**: tag resolution and Helm artifact pulls, including
//!   Amazon ECR login
//!
//! Loaded charts go through a two-tier cache (in-memory per expansion and
//! on disk per cache root) and have their declared dependencies resolved
//! recursively through the same loader.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hrx_repo::{ChartCache, ChartLoader, Credentials, RepositoryKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ChartCache::new("/tmp/hrx-cache", true);
//! let loader = ChartLoader::builder(cache)
//!     .credentials(Credentials::load_from("credentials.yaml".as_ref())?)
//!     .build();
//!
//! let source = RepositoryKind::from_url("https://charts.example.com")?;
//! let chart = loader.load(&source, "nginx", "^15.0.0", None).await?;
//! println!("{} {}", chart.name(), chart.version());
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are never sent after cross-origin redirects
//! - Published chart digests are verified on download
//! - SSH keys are written with owner-only permissions for the clone only

pub mod cache;
pub mod context;
pub mod credentials;
mod dependency;
pub mod error;
pub mod git;
pub mod helm;
pub mod http;
pub mod index;
pub mod loader;
pub mod location;
pub mod oci;
pub mod source;
pub mod version;

// Re-exports for convenience
pub use cache::{ChartCache, ChartIdentity, EphemeralGuard};
pub use context::ChartContext;
pub use credentials::{CredentialValues, Credentials, HttpAuth};
pub use error::{ErrorCategory, RepoError, Result};
pub use git::{CloneRequest, GitClient, GitReference, GitRepoSubstitution, SystemGit};
pub use http::HttpClient;
pub use index::{ChartEntry, RepositoryIndex};
pub use loader::{ChartLoader, ChartLoaderBuilder, LoadFuture};
pub use oci::{OciDistributionFactory, RegistryClient, RegistryClientFactory};
pub use source::{GitSource, HelmSource, OciSource, RepositoryKind, RepositoryMeta};
pub use version::Constraint;
