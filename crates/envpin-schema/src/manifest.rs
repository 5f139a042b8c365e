use crate::expr::ExprError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("{0} must not be empty")]
    EmptyIdentifier(&'static str),
    #[error("package '{0}' is declared more than once")]
    DuplicatePackage(String),
    #[error("toolchain '{0}' is declared more than once")]
    DuplicateToolchain(String),
    #[error("artifact name '{0}' is used by both a toolchain and a package")]
    DuplicateArtifactName(String),
    #[error("toolchains '{first}' and '{second}' both claim role '{role}'")]
    DuplicateRole {
        role: String,
        first: String,
        second: String,
    },
    #[error("no toolchain is assigned the 'primary' role")]
    MissingPrimary,
    #[error("invalid toolchain channel '{0}', expected stable, beta, nightly, nightly-YYYY-MM-DD or a version")]
    InvalidChannel(String),
    #[error("toolchain '{0}' is marked cross but declares no targets")]
    CrossWithoutTargets(String),
    #[error("invalid variable name '{0}', expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidVariableName(String),
    #[error("variable '{0}' is reserved and set by activation")]
    ReservedVariable(String),
    #[error("invalid expression in variable '{name}': {source}")]
    InvalidExpression {
        name: String,
        #[source]
        source: ExprError,
    },
}

/// Raw manifest as written by the user.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ManifestV1 {
    pub manifest_version: u32,
    #[serde(default, rename = "toolchain")]
    pub toolchains: Vec<ToolchainSection>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub channel: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub cross: bool,
}

pub const PRIMARY_ROLE: &str = "primary";

/// Variables the activation description always sets itself.
pub const RESERVED_VARIABLES: [&str; 2] = ["PATH", "ENVPIN_MANIFEST_HASH"];

fn default_role() -> String {
    PRIMARY_ROLE.to_owned()
}

pub fn parse_manifest_str(input: &str) -> Result<ManifestV1, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ManifestV1, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
