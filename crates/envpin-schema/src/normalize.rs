use crate::expr::{is_valid_variable_name, Template};
use crate::manifest::{
    ManifestError, ManifestV1, ToolchainSection, PRIMARY_ROLE, RESERVED_VARIABLES,
};
use crate::types::PackageId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Release channel a toolchain is drawn from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    Stable,
    Beta,
    /// `nightly`, optionally pinned to a dated build (`nightly-2024-05-01`).
    Nightly(Option<String>),
    /// An exact release such as `1.82.0`.
    Pinned(String),
}

impl Channel {
    /// Whether candidates from this channel can differ between provider snapshots.
    pub fn is_floating(&self) -> bool {
        matches!(self, Channel::Stable | Channel::Beta | Channel::Nightly(None))
    }
}

impl FromStr for Channel {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "stable" => return Ok(Channel::Stable),
            "beta" => return Ok(Channel::Beta),
            "nightly" => return Ok(Channel::Nightly(None)),
            _ => {}
        }
        if let Some(date) = s.strip_prefix("nightly-") {
            if is_iso_date(date) {
                return Ok(Channel::Nightly(Some(date.to_owned())));
            }
            return Err(ManifestError::InvalidChannel(s.to_owned()));
        }
        if is_version(s) {
            return Ok(Channel::Pinned(s.to_owned()));
        }
        Err(ManifestError::InvalidChannel(s.to_owned()))
    }
}

impl TryFrom<String> for Channel {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stable => write!(f, "stable"),
            Channel::Beta => write!(f, "beta"),
            Channel::Nightly(None) => write!(f, "nightly"),
            Channel::Nightly(Some(date)) => write!(f, "nightly-{date}"),
            Channel::Pinned(version) => f.write_str(version),
        }
    }
}

fn is_iso_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == 3
        && parts[0].len() == 4
        && parts[1].len() == 2
        && parts[2].len() == 2
        && parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit()))
}

fn is_version(s: &str) -> bool {
    let core = s.split_once('-').map_or(s, |(core, _)| core);
    let parts: Vec<&str> = core.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// A validated toolchain declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolchainSpec {
    pub name: String,
    pub role: String,
    pub channel: Channel,
    pub extensions: Vec<String>,
    pub targets: Vec<String>,
    pub cross: bool,
}

/// Canonical representation of a parsed manifest.
///
/// Packages, extensions and targets are sorted and trimmed; variables are kept
/// in a sorted map. Toolchain order is preserved because it decides search path
/// precedence. This is the input to content hashing and resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedManifest {
    pub manifest_version: u32,
    pub toolchains: Vec<ToolchainSpec>,
    pub packages: Vec<PackageId>,
    pub variables: BTreeMap<String, String>,
}

impl ManifestV1 {
    /// Validate and canonicalize the manifest.
    pub fn normalize(&self) -> Result<NormalizedManifest, ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }

        let mut toolchains = Vec::with_capacity(self.toolchains.len());
        let mut roles: BTreeMap<String, String> = BTreeMap::new();
        let mut names: BTreeSet<String> = BTreeSet::new();
        for section in &self.toolchains {
            let spec = normalize_toolchain(section)?;
            if !names.insert(spec.name.clone()) {
                return Err(ManifestError::DuplicateToolchain(spec.name));
            }
            if let Some(first) = roles.get(&spec.role) {
                return Err(ManifestError::DuplicateRole {
                    role: spec.role.clone(),
                    first: first.clone(),
                    second: spec.name,
                });
            }
            roles.insert(spec.role.clone(), spec.name.clone());
            toolchains.push(spec);
        }
        if !toolchains.is_empty() && !roles.contains_key(PRIMARY_ROLE) {
            return Err(ManifestError::MissingPrimary);
        }

        let mut packages = Vec::with_capacity(self.packages.len());
        let mut seen = BTreeSet::new();
        for raw in &self.packages {
            let id = raw.trim();
            if id.is_empty() {
                return Err(ManifestError::EmptyIdentifier("package id"));
            }
            if !seen.insert(id.to_owned()) {
                return Err(ManifestError::DuplicatePackage(id.to_owned()));
            }
            if names.contains(id) {
                return Err(ManifestError::DuplicateArtifactName(id.to_owned()));
            }
            packages.push(PackageId::new(id));
        }
        packages.sort();

        let mut variables = BTreeMap::new();
        for (name, value) in &self.variables {
            if !is_valid_variable_name(name) {
                return Err(ManifestError::InvalidVariableName(name.clone()));
            }
            if RESERVED_VARIABLES.contains(&name.as_str()) {
                return Err(ManifestError::ReservedVariable(name.clone()));
            }
            Template::parse(value).map_err(|source| ManifestError::InvalidExpression {
                name: name.clone(),
                source,
            })?;
            variables.insert(name.clone(), value.clone());
        }

        Ok(NormalizedManifest {
            manifest_version: self.manifest_version,
            toolchains,
            packages,
            variables,
        })
    }
}

fn normalize_toolchain(section: &ToolchainSection) -> Result<ToolchainSpec, ManifestError> {
    let name = section.name.trim().to_owned();
    if name.is_empty() {
        return Err(ManifestError::EmptyIdentifier("toolchain name"));
    }
    let role = section.role.trim().to_lowercase();
    if role.is_empty() {
        return Err(ManifestError::EmptyIdentifier("toolchain role"));
    }
    let channel: Channel = section.channel.parse()?;
    let targets = normalize_string_list(&section.targets);
    if section.cross && targets.is_empty() {
        return Err(ManifestError::CrossWithoutTargets(name));
    }

    Ok(ToolchainSpec {
        name,
        role,
        channel,
        extensions: normalize_string_list(&section.extensions),
        targets,
        cross: section.cross,
    })
}

fn normalize_string_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest_str;

    fn normalize(input: &str) -> Result<NormalizedManifest, ManifestError> {
        parse_manifest_str(input).unwrap().normalize()
    }

    #[test]
    fn normalizes_and_sorts_deterministically() {
        let n = normalize(
            r#"
manifest_version = 1
packages = ["wasm-tools", " linker-tool "]

[[toolchain]]
name = "rust"
channel = "stable"
extensions = ["rust-src", "clippy", "rust-src"]
targets = ["wasm32-wasip1", "aarch64-unknown-linux-gnu"]
"#,
        )
        .unwrap();

        assert_eq!(n.packages, vec!["linker-tool", "wasm-tools"]);
        assert_eq!(n.toolchains[0].extensions, vec!["clippy", "rust-src"]);
        assert_eq!(
            n.toolchains[0].targets,
            vec!["aarch64-unknown-linux-gnu", "wasm32-wasip1"]
        );
        assert_eq!(n.toolchains[0].channel, Channel::Stable);
    }

    #[test]
    fn package_order_does_not_change_normal_form() {
        let a = normalize("manifest_version = 1\npackages = [\"git\", \"clang\"]\n").unwrap();
        let b = normalize("manifest_version = 1\npackages = [\"clang\", \"git\"]\n").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_duplicate_packages() {
        let err = normalize("manifest_version = 1\npackages = [\"git\", \" git\"]\n").unwrap_err();
        assert!(matches!(err, ManifestError::DuplicatePackage(ref p) if p == "git"));
    }

    #[test]
    fn rejects_empty_package_id() {
        let err = normalize("manifest_version = 1\npackages = [\"  \"]\n").unwrap_err();
        assert!(matches!(err, ManifestError::EmptyIdentifier(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = normalize("manifest_version = 2\n").unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedVersion(2)));
    }

    #[test]
    fn rejects_two_primary_toolchains() {
        let err = normalize(
            r#"
manifest_version = 1

[[toolchain]]
name = "rust-stable"
channel = "stable"

[[toolchain]]
name = "rust-nightly"
channel = "nightly"
"#,
        )
        .unwrap_err();
        match err {
            ManifestError::DuplicateRole {
                role,
                first,
                second,
            } => {
                assert_eq!(role, "primary");
                assert_eq!(first, "rust-stable");
                assert_eq!(second, "rust-nightly");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_missing_primary() {
        let err = normalize(
            r#"
manifest_version = 1

[[toolchain]]
name = "zig"
role = "c-compiler"
channel = "0.13.0"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::MissingPrimary));
    }

    #[test]
    fn rejects_duplicate_toolchain_names() {
        let err = normalize(
            r#"
manifest_version = 1

[[toolchain]]
name = "rust"
channel = "stable"

[[toolchain]]
name = "rust"
role = "secondary"
channel = "beta"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateToolchain(_)));
    }

    #[test]
    fn rejects_package_shadowing_toolchain() {
        let err = normalize(
            r#"
manifest_version = 1
packages = ["rust"]

[[toolchain]]
name = "rust"
channel = "stable"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateArtifactName(_)));
    }

    #[test]
    fn rejects_cross_without_targets() {
        let err = normalize(
            r#"
manifest_version = 1

[[toolchain]]
name = "rust"
channel = "stable"
cross = true
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::CrossWithoutTargets(_)));
    }

    #[test]
    fn rejects_bad_variable_expression() {
        let err = normalize(
            r#"
manifest_version = 1

[variables]
LINKER = "${path:linker-tool"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidExpression { ref name, .. } if name == "LINKER"));
    }

    #[test]
    fn rejects_bad_variable_name() {
        let err = normalize(
            r#"
manifest_version = 1

[variables]
"BAD-NAME" = "x"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidVariableName(_)));
    }

    #[test]
    fn rejects_reserved_variable() {
        let err = normalize(
            r#"
manifest_version = 1

[variables]
PATH = "/usr/bin"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::ReservedVariable(ref v) if v == "PATH"));
    }

    #[test]
    fn parses_channels() {
        assert_eq!("stable".parse::<Channel>().unwrap(), Channel::Stable);
        assert_eq!("beta".parse::<Channel>().unwrap(), Channel::Beta);
        assert_eq!("nightly".parse::<Channel>().unwrap(), Channel::Nightly(None));
        assert_eq!(
            "nightly-2024-05-01".parse::<Channel>().unwrap(),
            Channel::Nightly(Some("2024-05-01".to_owned()))
        );
        assert_eq!(
            "1.82.0".parse::<Channel>().unwrap(),
            Channel::Pinned("1.82.0".to_owned())
        );
        assert_eq!(
            "1.82".parse::<Channel>().unwrap(),
            Channel::Pinned("1.82".to_owned())
        );
        assert!("nightly-24-5-1".parse::<Channel>().is_err());
        assert!("latest".parse::<Channel>().is_err());
        assert!("1".parse::<Channel>().is_err());
    }

    #[test]
    fn channel_display_round_trips() {
        for raw in ["stable", "beta", "nightly", "nightly-2024-05-01", "1.82.0"] {
            let channel: Channel = raw.parse().unwrap();
            assert_eq!(channel.to_string(), raw);
        }
    }

    #[test]
    fn floating_channels() {
        assert!(Channel::Stable.is_floating());
        assert!(Channel::Nightly(None).is_floating());
        assert!(!Channel::Pinned("1.82.0".to_owned()).is_floating());
        assert!(!Channel::Nightly(Some("2024-05-01".to_owned())).is_floating());
    }

    #[test]
    fn role_is_case_insensitive() {
        let n = normalize(
            r#"
manifest_version = 1

[[toolchain]]
name = "rust"
role = "Primary"
channel = "stable"
"#,
        )
        .unwrap();
        assert_eq!(n.toolchains[0].role, PRIMARY_ROLE);
    }
}
