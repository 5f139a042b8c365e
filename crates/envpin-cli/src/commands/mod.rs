pub mod activate;
pub mod completions;
pub mod forget;
pub mod hash;
pub mod inspect;
pub mod list;
pub mod resolve;
pub mod run;
pub mod verify_store;

use envpin_core::{CoreError, EnvpinConfig, ResolveOptions, ResolveOutcome, Resolver};
use envpin_provider::{Catalog, CatalogProvider};
use envpin_schema::{load_manifest_file, ContentHash, NormalizedManifest};
use envpin_store::{LockStore, StoreLayout};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_LOCK_CONFLICT: u8 = 4;

/// Paths and output mode shared by every store-backed command.
pub struct Context {
    pub store_root: PathBuf,
    pub catalog: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    pub fn new(
        config: &EnvpinConfig,
        store: Option<&Path>,
        catalog: Option<&Path>,
        json: bool,
    ) -> Result<Self, String> {
        let store_root = config.store_root(store).map_err(|e| e.to_string())?;
        let catalog = config.catalog_path(catalog);
        debug!(
            "store root {}, catalog {}",
            store_root.display(),
            catalog
                .as_deref()
                .map_or_else(|| "(none)".to_owned(), |p| p.display().to_string())
        );
        Ok(Self {
            store_root,
            catalog,
            json,
        })
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.store_root)
    }

    pub fn open_store(&self) -> Result<LockStore, String> {
        LockStore::open(self.layout()).map_err(|e| format!("store error: {e}"))
    }

    /// The catalog provider. Offline commands never query it, so an empty
    /// catalog stands in when none is configured.
    pub fn provider(&self, offline: bool) -> Result<CatalogProvider, String> {
        match &self.catalog {
            Some(path) => CatalogProvider::from_file(path)
                .map_err(|e| format!("catalog {}: {e}", path.display())),
            None if offline => {
                CatalogProvider::new(Catalog::default()).map_err(|e| e.to_string())
            }
            None => Err(
                "no provider catalog configured; pass --catalog or set \"catalog\" in ~/.config/envpin/config.json"
                    .to_owned(),
            ),
        }
    }

    /// Load, resolve and report progress on one manifest.
    pub fn resolve(
        &self,
        manifest: &Path,
        options: ResolveOptions,
    ) -> Result<ResolveOutcome, String> {
        let normalized = load_manifest(manifest)?;
        let store = self.open_store()?;
        let provider = self.provider(options.offline)?;

        let pb = if self.json {
            None
        } else {
            Some(spinner("resolving environment..."))
        };
        match Resolver::new(&provider, &store).resolve_with_options(&normalized, options) {
            Ok(outcome) => {
                if let Some(ref pb) = pb {
                    let msg = if outcome.cache_hit {
                        format!("environment {} (locked)", outcome.identity.short)
                    } else {
                        format!("environment {} resolved", outcome.identity.short)
                    };
                    spin_ok(pb, &msg);
                }
                Ok(outcome)
            }
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, "resolution failed");
                }
                Err(e.to_string())
            }
        }
    }
}

pub fn load_manifest(path: &Path) -> Result<NormalizedManifest, String> {
    load_manifest_file(path).map_err(|e| CoreError::from(e).to_string())
}

/// Find the lock entry whose hash is `input` or starts with it.
pub fn resolve_hash(store: &LockStore, input: &str) -> Result<ContentHash, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty manifest hash; pass a full hash or a unique prefix".to_owned());
    }
    let hashes = store.hashes().map_err(|e| format!("store error: {e}"))?;
    if let Some(exact) = hashes.iter().find(|h| **h == *input) {
        return Ok(exact.clone());
    }

    let matches: Vec<_> = hashes.iter().filter(|h| h.starts_with(input)).collect();
    match matches.len() {
        0 => Err(format!("no lock entry matching '{input}'")),
        1 => Ok(matches[0].clone()),
        n => Err(format!(
            "ambiguous hash prefix '{input}': matches {n} lock entries"
        )),
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_kind(kind: &str) -> String {
    use console::Style;
    match kind {
        "toolchain" => Style::new().cyan().bold().apply_to(kind).to_string(),
        "package" => Style::new().green().apply_to(kind).to_string(),
        other => other.to_owned(),
    }
}
