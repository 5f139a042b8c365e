//! Activation descriptions.
//!
//! Materializing a resolved environment produces the executable search path
//! and the final variable mapping a caller needs to run inside it. Nothing
//! here touches the current process: callers apply the description to a child
//! [`Command`] or print it as a shell script.

use crate::CoreError;
use envpin_schema::ResolvedEnvironment;
use serde::Serialize;
use std::collections::BTreeMap;
use std::env::JoinPathsError;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

/// Variable carrying the manifest content hash of the active environment.
pub const MANIFEST_HASH_VARIABLE: &str = "ENVPIN_MANIFEST_HASH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationDescription {
    /// Directories to put in front of `PATH`, highest precedence first.
    pub search_path: Vec<PathBuf>,
    pub variables: BTreeMap<String, String>,
}

/// Build the activation description of a resolved environment.
///
/// The search path lists each artifact's executable directory in artifact
/// order (toolchains in declaration order, then packages), keeping only the
/// first occurrence of a directory.
pub fn materialize(environment: &ResolvedEnvironment) -> ActivationDescription {
    let mut search_path: Vec<PathBuf> = Vec::with_capacity(environment.artifacts.len());
    for artifact in &environment.artifacts {
        let dir = artifact.bin_path();
        if !search_path.contains(&dir) {
            search_path.push(dir);
        }
    }

    let mut variables = environment.variables.clone();
    variables.insert(
        MANIFEST_HASH_VARIABLE.to_owned(),
        environment.manifest_hash.to_string(),
    );

    ActivationDescription {
        search_path,
        variables,
    }
}

impl ActivationDescription {
    /// The search path prepended to `existing` using the platform separator.
    pub fn path_value(&self, existing: Option<&OsStr>) -> Result<OsString, JoinPathsError> {
        let mut entries = self.search_path.clone();
        if let Some(existing) = existing {
            entries.extend(std::env::split_paths(existing));
        }
        std::env::join_paths(entries)
    }

    /// Set `PATH` and every variable on a child command.
    pub fn apply_to(
        &self,
        command: &mut Command,
        existing_path: Option<&OsStr>,
    ) -> Result<(), JoinPathsError> {
        command.env("PATH", self.path_value(existing_path)?);
        command.envs(&self.variables);
        Ok(())
    }

    pub fn render(&self, format: ShellFormat) -> Result<String, CoreError> {
        let path: Vec<String> = self
            .search_path
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();

        let mut out = String::new();
        match format {
            ShellFormat::Posix => {
                if !path.is_empty() {
                    out.push_str(&format!(
                        "export PATH={}\"${{PATH:+:$PATH}}\"\n",
                        posix_quote(&path.join(":"))
                    ));
                }
                for (name, value) in &self.variables {
                    out.push_str(&format!("export {name}={}\n", posix_quote(value)));
                }
            }
            ShellFormat::Fish => {
                if !path.is_empty() {
                    let quoted: Vec<String> = path.iter().map(|p| fish_quote(p)).collect();
                    out.push_str(&format!("set -gx PATH {} $PATH\n", quoted.join(" ")));
                }
                for (name, value) in &self.variables {
                    out.push_str(&format!("set -gx {name} {}\n", fish_quote(value)));
                }
            }
            ShellFormat::Dotenv => {
                if !path.is_empty() {
                    out.push_str(&format!(
                        "PATH=\"{}:${{PATH}}\"\n",
                        dotenv_escape(&path.join(":"))
                    ));
                }
                for (name, value) in &self.variables {
                    out.push_str(&format!("{name}=\"{}\"\n", dotenv_escape(value)));
                }
            }
            ShellFormat::Json => {
                out = serde_json::to_string_pretty(self)?;
                out.push('\n');
            }
        }
        Ok(out)
    }
}

fn posix_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn fish_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}

fn dotenv_escape(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('$', r"\$")
        .replace('\n', r"\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFormat {
    Posix,
    Fish,
    Dotenv,
    Json,
}

impl FromStr for ShellFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posix" | "sh" | "bash" | "zsh" => Ok(ShellFormat::Posix),
            "fish" => Ok(ShellFormat::Fish),
            "dotenv" | "env" => Ok(ShellFormat::Dotenv),
            "json" => Ok(ShellFormat::Json),
            other => Err(CoreError::Config(format!(
                "unknown activation format '{other}', expected posix, fish, dotenv or json"
            ))),
        }
    }
}

impl fmt::Display for ShellFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellFormat::Posix => write!(f, "posix"),
            ShellFormat::Fish => write!(f, "fish"),
            ShellFormat::Dotenv => write!(f, "dotenv"),
            ShellFormat::Json => write!(f, "json"),
        }
    }
}
