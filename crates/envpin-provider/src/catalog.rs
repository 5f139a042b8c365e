use crate::{FetchRequest, Provider, ProviderError};
use envpin_schema::{Artifact, ArtifactKind, Channel, ToolchainSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A catalog snapshot: the complete set of artifacts a provider can supply.
///
/// ```toml
/// root = "/opt/envpin"
///
/// [[toolchain]]
/// name = "rust"
/// channel = "stable"
/// version = "1.82.0"
/// extensions = ["rust-src"]
/// targets = ["x86_64-unknown-linux-gnu", "wasm32-wasip1"]
///
/// [[package]]
/// id = "linker-tool"
/// version = "17.0.6"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Base directory for entries without an explicit `install_path`.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default, rename = "toolchain")]
    pub toolchains: Vec<CatalogToolchain>,
    #[serde(default, rename = "package")]
    pub packages: Vec<CatalogPackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CatalogToolchain {
    pub name: String,
    /// `stable`, `beta` or `nightly`.
    pub channel: String,
    pub version: String,
    /// Build date, used to match dated nightly requests.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub install_path: Option<String>,
    #[serde(default)]
    pub bin_dir: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CatalogPackage {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub install_path: Option<String>,
    #[serde(default)]
    pub bin_dir: Option<String>,
}

const CHANNELS: [&str; 3] = ["stable", "beta", "nightly"];

impl Catalog {
    pub fn parse(input: &str) -> Result<Self, ProviderError> {
        let catalog: Catalog = toml::from_str(input)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    fn validate(&self) -> Result<(), ProviderError> {
        let mut seen = BTreeSet::new();
        let mut paths = BTreeMap::new();
        for tc in &self.toolchains {
            if !CHANNELS.contains(&tc.channel.as_str()) {
                return Err(ProviderError::InvalidCatalog(format!(
                    "toolchain {}@{} has unknown channel '{}'",
                    tc.name, tc.version, tc.channel
                )));
            }
            let key = (
                "toolchain",
                tc.name.clone(),
                tc.channel.clone(),
                tc.version.clone(),
                tc.date.clone().unwrap_or_default(),
            );
            if !seen.insert(key) {
                return Err(ProviderError::InvalidCatalog(format!(
                    "toolchain {}@{} ({}) is listed twice",
                    tc.name, tc.version, tc.channel
                )));
            }
            let path = self.toolchain_path(tc)?;
            claim_path(&mut paths, path, format!("toolchain {}@{}", tc.name, tc.version))?;
        }
        for pkg in &self.packages {
            let key = (
                "package",
                pkg.id.clone(),
                String::new(),
                pkg.version.clone(),
                String::new(),
            );
            if !seen.insert(key) {
                return Err(ProviderError::InvalidCatalog(format!(
                    "package {}@{} is listed twice",
                    pkg.id, pkg.version
                )));
            }
            let path = self.package_path(pkg)?;
            claim_path(&mut paths, path, format!("package {}@{}", pkg.id, pkg.version))?;
        }
        Ok(())
    }

    /// `<root>/<name>-<version>`, with `-<date>` appended for dated builds.
    fn toolchain_path(&self, tc: &CatalogToolchain) -> Result<String, ProviderError> {
        let stem = match &tc.date {
            Some(date) => format!("{}-{}-{date}", tc.name, tc.version),
            None => format!("{}-{}", tc.name, tc.version),
        };
        self.install_path(&stem, tc.install_path.as_deref())
    }

    fn package_path(&self, pkg: &CatalogPackage) -> Result<String, ProviderError> {
        self.install_path(&format!("{}-{}", pkg.id, pkg.version), pkg.install_path.as_deref())
    }

    fn install_path(&self, stem: &str, explicit: Option<&str>) -> Result<String, ProviderError> {
        if let Some(path) = explicit {
            return Ok(path.to_owned());
        }
        let Some(root) = &self.root else {
            return Err(ProviderError::InvalidCatalog(format!(
                "{stem} has no install_path and the catalog has no root"
            )));
        };
        Ok(root.join(stem).to_string_lossy().into_owned())
    }
}

/// Two entries installed at one path would be indistinguishable once resolved.
fn claim_path(
    paths: &mut BTreeMap<String, String>,
    path: String,
    entry: String,
) -> Result<(), ProviderError> {
    if let Some(first) = paths.get(&path) {
        return Err(ProviderError::InvalidCatalog(format!(
            "{entry} and {first} share install path {path}"
        )));
    }
    paths.insert(path, entry);
    Ok(())
}

fn channel_matches(entry: &CatalogToolchain, channel: &Channel) -> bool {
    match channel {
        Channel::Stable => entry.channel == "stable",
        Channel::Beta => entry.channel == "beta",
        Channel::Nightly(None) => entry.channel == "nightly",
        Channel::Nightly(Some(date)) => {
            entry.channel == "nightly" && entry.date.as_deref() == Some(date.as_str())
        }
        // "1.82" selects any 1.82.x release.
        Channel::Pinned(version) => {
            entry.channel == "stable"
                && (entry.version == *version
                    || entry
                        .version
                        .strip_prefix(version.as_str())
                        .is_some_and(|rest| rest.starts_with('.')))
        }
    }
}

/// Provider answering from a fixed [`Catalog`] snapshot.
///
/// Answers are a pure function of the catalog, so resolution against one
/// snapshot is reproducible.
#[derive(Debug)]
pub struct CatalogProvider {
    catalog: Catalog,
    snapshot_id: String,
}

impl CatalogProvider {
    pub fn new(catalog: Catalog) -> Result<Self, ProviderError> {
        catalog.validate()?;
        let canonical = serde_json::to_vec(&catalog)
            .map_err(|e| ProviderError::InvalidCatalog(e.to_string()))?;
        let snapshot_id = blake3::hash(&canonical).to_hex().to_string();
        Ok(Self {
            catalog,
            snapshot_id,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        Self::new(Catalog::load(path)?)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn toolchain_candidates(&self, spec: &ToolchainSpec) -> Result<Vec<Artifact>, ProviderError> {
        self.catalog
            .toolchains
            .iter()
            .filter(|tc| tc.name == spec.name && channel_matches(tc, &spec.channel))
            .map(|tc| -> Result<Artifact, ProviderError> {
                Ok(Artifact {
                    name: tc.name.clone(),
                    kind: ArtifactKind::Toolchain,
                    version: tc.version.clone(),
                    install_path: self.catalog.toolchain_path(tc)?,
                    bin_dir: tc.bin_dir.clone().unwrap_or_else(|| "bin".to_owned()),
                    channel: Some(match &tc.date {
                        Some(date) => format!("{}-{date}", tc.channel),
                        None => tc.channel.clone(),
                    }),
                    extensions: sorted(&tc.extensions),
                    targets: sorted(&tc.targets),
                })
            })
            .collect()
    }

    fn package_candidates(&self, id: &str) -> Result<Vec<Artifact>, ProviderError> {
        self.catalog
            .packages
            .iter()
            .filter(|pkg| pkg.id == id)
            .map(|pkg| -> Result<Artifact, ProviderError> {
                Ok(Artifact {
                    name: pkg.id.clone(),
                    kind: ArtifactKind::Package,
                    version: pkg.version.clone(),
                    install_path: self.catalog.package_path(pkg)?,
                    bin_dir: pkg.bin_dir.clone().unwrap_or_else(|| "bin".to_owned()),
                    channel: None,
                    extensions: Vec::new(),
                    targets: Vec::new(),
                })
            })
            .collect()
    }
}

fn sorted(values: &[String]) -> Vec<String> {
    let mut out = values.to_vec();
    out.sort();
    out.dedup();
    out
}

impl Provider for CatalogProvider {
    fn name(&self) -> &'static str {
        "catalog"
    }

    /// blake3 digest of the catalog content.
    fn snapshot_id(&self) -> Option<&str> {
        Some(self.snapshot_id.as_str())
    }

    fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<Artifact>, ProviderError> {
        let candidates = match request {
            FetchRequest::Toolchain(spec) => self.toolchain_candidates(spec)?,
            FetchRequest::Package(id) => self.package_candidates(id)?,
        };
        debug!(
            "catalog offers {} candidate(s) for '{}'",
            candidates.len(),
            request.name()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envpin_schema::PackageId;

    const CATALOG: &str = r#"
root = "/opt/envpin"

[[toolchain]]
name = "rust"
channel = "stable"
version = "1.81.0"
extensions = ["rust-src"]
targets = ["x86_64-unknown-linux-gnu"]

[[toolchain]]
name = "rust"
channel = "stable"
version = "1.82.0"
extensions = ["rust-src", "clippy"]
targets = ["x86_64-unknown-linux-gnu", "wasm32-wasip1"]

[[toolchain]]
name = "rust"
channel = "nightly"
version = "1.84.0-nightly"
date = "2024-10-20"
install_path = "/nightly/rust-2024-10-20"

[[package]]
id = "linker-tool"
version = "17.0.6"

[[package]]
id = "linker-tool"
version = "18.1.0"
bin_dir = ""
"#;

    fn provider() -> CatalogProvider {
        CatalogProvider::new(Catalog::parse(CATALOG).unwrap()).unwrap()
    }

    fn spec(channel: &str) -> ToolchainSpec {
        ToolchainSpec {
            name: "rust".to_owned(),
            role: "primary".to_owned(),
            channel: channel.parse().unwrap(),
            extensions: Vec::new(),
            targets: Vec::new(),
            cross: false,
        }
    }

    fn versions(artifacts: &[Artifact]) -> Vec<&str> {
        let mut v: Vec<&str> = artifacts.iter().map(|a| a.version.as_str()).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn stable_lists_all_stable_builds() {
        let s = spec("stable");
        let got = provider().fetch(&FetchRequest::Toolchain(&s)).unwrap();
        assert_eq!(versions(&got), vec!["1.81.0", "1.82.0"]);
        assert!(got.iter().all(|a| a.kind == ArtifactKind::Toolchain));
        assert!(got.iter().all(|a| a.channel.as_deref() == Some("stable")));
    }

    #[test]
    fn pinned_version_matches_exact_and_prefix() {
        let p = provider();
        let exact = spec("1.81.0");
        assert_eq!(
            versions(&p.fetch(&FetchRequest::Toolchain(&exact)).unwrap()),
            vec!["1.81.0"]
        );
        let minor = spec("1.82");
        assert_eq!(
            versions(&p.fetch(&FetchRequest::Toolchain(&minor)).unwrap()),
            vec!["1.82.0"]
        );
        let prefix_trap = spec("1.8");
        assert!(p
            .fetch(&FetchRequest::Toolchain(&prefix_trap))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn dated_nightly_matches_date() {
        let p = provider();
        let dated = spec("nightly-2024-10-20");
        let got = p.fetch(&FetchRequest::Toolchain(&dated)).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].install_path, "/nightly/rust-2024-10-20");
        assert_eq!(got[0].channel.as_deref(), Some("nightly-2024-10-20"));

        let other = spec("nightly-2024-01-01");
        assert!(p.fetch(&FetchRequest::Toolchain(&other)).unwrap().is_empty());
    }

    #[test]
    fn beta_with_no_builds_is_empty() {
        let s = spec("beta");
        assert!(provider()
            .fetch(&FetchRequest::Toolchain(&s))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn packages_get_default_install_paths() {
        let id = PackageId::new("linker-tool");
        let got = provider().fetch(&FetchRequest::Package(&id)).unwrap();
        assert_eq!(versions(&got), vec!["17.0.6", "18.1.0"]);
        let old = got.iter().find(|a| a.version == "17.0.6").unwrap();
        assert_eq!(old.install_path, "/opt/envpin/linker-tool-17.0.6");
        assert_eq!(old.bin_dir, "bin");
        let new = got.iter().find(|a| a.version == "18.1.0").unwrap();
        assert_eq!(new.bin_dir, "");
    }

    #[test]
    fn unknown_package_is_empty() {
        let id = PackageId::new("nope");
        assert!(provider().fetch(&FetchRequest::Package(&id)).unwrap().is_empty());
    }

    #[test]
    fn rejects_entry_without_path_or_root() {
        let err = Catalog::parse(
            r#"
[[package]]
id = "x"
version = "1"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCatalog(_)));
    }

    #[test]
    fn rejects_duplicate_entries() {
        let err = Catalog::parse(
            r#"
root = "/r"
[[package]]
id = "x"
version = "1"
[[package]]
id = "x"
version = "1"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn rejects_unknown_channel() {
        let err = Catalog::parse(
            r#"
root = "/r"
[[toolchain]]
name = "rust"
channel = "lts"
version = "1"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown channel"));
    }

    #[test]
    fn snapshot_id_tracks_content() {
        let a = provider();
        let b = provider();
        assert!(a.snapshot_id().is_some());
        assert_eq!(a.snapshot_id(), b.snapshot_id());
        let changed = CatalogProvider::new(
            Catalog::parse(&CATALOG.replace("18.1.0", "18.1.1")).unwrap(),
        )
        .unwrap();
        assert_ne!(a.snapshot_id(), changed.snapshot_id());
    }

    #[test]
    fn dated_nightlies_get_distinct_default_paths() {
        let catalog = Catalog::parse(
            r#"
root = "/opt/envpin"
[[toolchain]]
name = "rust"
channel = "nightly"
version = "1.84.0-nightly"
date = "2024-10-20"
[[toolchain]]
name = "rust"
channel = "nightly"
version = "1.84.0-nightly"
date = "2024-10-21"
"#,
        )
        .unwrap();
        let p = CatalogProvider::new(catalog).unwrap();
        let nightly = spec("nightly");
        let mut paths: Vec<String> = p
            .fetch(&FetchRequest::Toolchain(&nightly))
            .unwrap()
            .into_iter()
            .map(|a| a.install_path)
            .collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                "/opt/envpin/rust-1.84.0-nightly-2024-10-20",
                "/opt/envpin/rust-1.84.0-nightly-2024-10-21",
            ]
        );
    }

    #[test]
    fn rejects_shared_install_path() {
        let err = Catalog::parse(
            r#"
[[toolchain]]
name = "rust"
channel = "nightly"
version = "1.84.0-nightly"
date = "2024-10-20"
install_path = "/opt/rust-nightly"
[[toolchain]]
name = "rust"
channel = "nightly"
version = "1.84.0-nightly"
date = "2024-10-21"
install_path = "/opt/rust-nightly"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("share install path /opt/rust-nightly"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        fs::write(&path, CATALOG).unwrap();
        let p = CatalogProvider::from_file(&path).unwrap();
        assert_eq!(p.catalog().toolchains.len(), 3);
        assert_eq!(p.name(), "catalog");
    }
}
