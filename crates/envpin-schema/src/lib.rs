//! Manifest parsing, normalization, content hashing, and resolved-environment
//! types for envpin.
//!
//! This crate defines the schema layer: TOML manifest parsing (`ManifestV1`),
//! the canonical `NormalizedManifest`, the order-independent manifest content
//! hash (`compute_manifest_hash`), variable templates (`Template`), and the
//! `ResolvedEnvironment` produced by resolution.

pub mod expr;
pub mod identity;
pub mod manifest;
pub mod normalize;
pub mod resolved;
pub mod types;

pub use expr::{ExprError, RefKind, Template};
pub use identity::{compute_manifest_hash, ManifestIdentity};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, ManifestError, ManifestV1, ToolchainSection,
    PRIMARY_ROLE, RESERVED_VARIABLES,
};
pub use normalize::{Channel, NormalizedManifest, ToolchainSpec};
pub use resolved::{Artifact, ArtifactKind, ResolvedEnvironment};
pub use types::{ContentHash, PackageId, ShortHash};

use std::path::Path;

/// Parse and normalize a manifest from a string.
pub fn load_manifest_str(input: &str) -> Result<NormalizedManifest, ManifestError> {
    parse_manifest_str(input)?.normalize()
}

/// Parse and normalize a manifest file.
pub fn load_manifest_file(path: impl AsRef<Path>) -> Result<NormalizedManifest, ManifestError> {
    parse_manifest_file(path)?.normalize()
}
