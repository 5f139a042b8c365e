//! Artifact providers for envpin.
//!
//! A provider is the external supplier of concrete, versioned artifacts. This
//! crate defines the `Provider` trait the resolver queries, the version
//! ordering used to break ties between candidates, and `CatalogProvider`, a
//! provider backed by a fixed TOML catalog snapshot.

pub mod catalog;
pub mod version;

pub use catalog::{Catalog, CatalogPackage, CatalogProvider, CatalogToolchain};
pub use version::compare_versions;

use envpin_schema::{Artifact, PackageId, ToolchainSpec};
use std::cmp::Ordering;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
    #[error("failed to parse catalog: {0}")]
    ParseCatalog(#[from] toml::de::Error),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider query for '{reference}' timed out after {after:?}")]
    Timeout { reference: String, after: Duration },
}

/// What the resolver asks a provider for.
#[derive(Debug, Clone, Copy)]
pub enum FetchRequest<'a> {
    Toolchain(&'a ToolchainSpec),
    Package(&'a PackageId),
}

impl FetchRequest<'_> {
    /// Artifact name the request resolves.
    pub fn name(&self) -> &str {
        match self {
            FetchRequest::Toolchain(spec) => &spec.name,
            FetchRequest::Package(id) => id.as_str(),
        }
    }
}

pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Every candidate artifact matching the request's identity and channel.
    ///
    /// An empty list means the provider knows no such artifact. Candidates are
    /// returned in no particular order; the resolver picks the greatest by
    /// [`Provider::compare_versions`].
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<Artifact>, ProviderError>;

    /// Identifies the snapshot this provider answers from, if it has one.
    fn snapshot_id(&self) -> Option<&str> {
        None
    }

    /// The provider's version ordering.
    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        compare_versions(a, b)
    }
}
