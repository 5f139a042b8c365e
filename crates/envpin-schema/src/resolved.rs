use crate::expr::RefKind;
use crate::types::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Toolchain,
    Package,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Toolchain => write!(f, "toolchain"),
            ArtifactKind::Package => write!(f, "package"),
        }
    }
}

fn default_bin_dir() -> String {
    "bin".to_owned()
}

/// A concrete, versioned, installable unit supplied by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub version: String,
    pub install_path: String,
    /// Executable directory relative to `install_path`. Empty means the install
    /// path itself.
    #[serde(default = "default_bin_dir")]
    pub bin_dir: String,
    /// Channel the artifact was published on. Only meaningful for toolchains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Artifact {
    pub fn bin_path(&self) -> PathBuf {
        let root = Path::new(&self.install_path);
        if self.bin_dir.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&self.bin_dir)
        }
    }

    /// Value substituted for a `${kind:name}` reference to this artifact.
    pub fn reference_value(&self, kind: RefKind) -> String {
        match kind {
            RefKind::Path => self.install_path.clone(),
            RefKind::Version => self.version.clone(),
            RefKind::Bin => self.bin_path().to_string_lossy().into_owned(),
        }
    }

    pub fn supports_target(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target)
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }
}

/// The fully resolved, immutable result of resolving one manifest.
///
/// Identity is `manifest_hash`. `created_at` and `provider_snapshot` are
/// bookkeeping only: two environments with equal hash, artifacts and variables
/// are the same environment regardless of when, or from which snapshot, each
/// was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    pub manifest_hash: ContentHash,
    pub artifacts: Vec<Artifact>,
    pub variables: BTreeMap<String, String>,
    pub created_at: String,
    /// Snapshot of the provider that answered the resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_snapshot: Option<String>,
}

#[derive(Serialize)]
struct SemanticContent<'a> {
    manifest_hash: &'a ContentHash,
    artifacts: &'a [Artifact],
    variables: &'a BTreeMap<String, String>,
}

impl ResolvedEnvironment {
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn toolchains(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Toolchain)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Package)
    }

    /// Equality ignoring `created_at`.
    pub fn is_semantically_equal(&self, other: &Self) -> bool {
        self.manifest_hash == other.manifest_hash
            && self.artifacts == other.artifacts
            && self.variables == other.variables
    }

    /// blake3 digest over the semantic content.
    pub fn content_digest(&self) -> Result<String, serde_json::Error> {
        let content = SemanticContent {
            manifest_hash: &self.manifest_hash,
            artifacts: &self.artifacts,
            variables: &self.variables,
        };
        let json = serde_json::to_vec(&content)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }
}
