use crate::CoreError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// User configuration read from `~/.config/envpin/config.json`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvpinConfig {
    /// Lock store root. Defaults to `~/.local/share/envpin`.
    #[serde(default)]
    pub store: Option<PathBuf>,
    /// Provider catalog snapshot.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

impl EnvpinConfig {
    /// Load the default config file, or an empty config when it does not exist.
    pub fn load_default() -> Result<Self, CoreError> {
        Self::load_from_home(std::env::var_os("HOME").map(PathBuf::from).as_deref())
    }

    fn load_from_home(home: Option<&Path>) -> Result<Self, CoreError> {
        let Some(home) = home else {
            debug!("HOME not set, skipping config file");
            return Ok(Self::default());
        };
        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.store = config.store.map(|p| expand_home(&p));
        config.catalog = config.catalog.map(|p| expand_home(&p));
        Ok(config)
    }

    /// Store root: `override_path` if given, then the config, then the default.
    pub fn store_root(&self, override_path: Option<&Path>) -> Result<PathBuf, CoreError> {
        if let Some(p) = override_path {
            return Ok(expand_home(p));
        }
        if let Some(p) = &self.store {
            return Ok(p.clone());
        }
        Ok(home_dir()?.join(".local/share/envpin"))
    }

    /// Catalog path: `override_path` if given, then the config.
    pub fn catalog_path(&self, override_path: Option<&Path>) -> Option<PathBuf> {
        override_path
            .map(expand_home)
            .or_else(|| self.catalog.clone())
    }
}

const CONFIG_FILE: &str = ".config/envpin/config.json";

fn home_dir() -> Result<PathBuf, CoreError> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| CoreError::Config("HOME not set; pass --store".to_owned()))
}

/// Expand a leading `~/` against `HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_config_under_home() {
        let home = tempfile::tempdir().unwrap();
        let path = home.path().join(CONFIG_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::json!({
                "store": home.path().join("store"),
                "catalog": home.path().join("catalog.toml"),
            })
            .to_string(),
        )
        .unwrap();

        let loaded = EnvpinConfig::load_from_home(Some(home.path())).unwrap();
        assert_eq!(loaded.store, Some(home.path().join("store")));
        assert_eq!(loaded.catalog, Some(home.path().join("catalog.toml")));
    }

    #[test]
    fn missing_file_is_default() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(
            EnvpinConfig::load_from_home(Some(home.path())).unwrap(),
            EnvpinConfig::default()
        );
    }

    #[test]
    fn missing_home_is_default_and_overrides_still_apply() {
        let config = EnvpinConfig::load_from_home(None).unwrap();
        assert_eq!(config, EnvpinConfig::default());
        assert_eq!(
            config.store_root(Some(Path::new("/srv/envpin"))).unwrap(),
            PathBuf::from("/srv/envpin")
        );
        assert_eq!(
            config.catalog_path(Some(Path::new("/srv/catalog.toml"))),
            Some(PathBuf::from("/srv/catalog.toml"))
        );
    }

    #[test]
    fn empty_object_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(EnvpinConfig::load(&path).unwrap(), EnvpinConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"remote": "https://example.com"}"#).unwrap();
        assert!(matches!(
            EnvpinConfig::load(&path).unwrap_err(),
            CoreError::Config(_)
        ));
    }

    #[test]
    fn override_wins_over_config() {
        let config = EnvpinConfig {
            store: Some(PathBuf::from("/from/config")),
            catalog: Some(PathBuf::from("/from/config/catalog.toml")),
        };
        assert_eq!(
            config.store_root(Some(Path::new("/from/flag"))).unwrap(),
            PathBuf::from("/from/flag")
        );
        assert_eq!(
            config.store_root(None).unwrap(),
            PathBuf::from("/from/config")
        );
        assert_eq!(
            config.catalog_path(None),
            Some(PathBuf::from("/from/config/catalog.toml"))
        );
    }

    #[test]
    fn absolute_paths_are_not_expanded() {
        assert_eq!(
            expand_home(Path::new("/var/envpin")),
            PathBuf::from("/var/envpin")
        );
        assert_eq!(expand_home(Path::new("~user")), PathBuf::from("~user"));
    }
}
