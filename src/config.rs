use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::PermissionContext;
use crate::error::KiraError;

pub const CONFIG_FILE: &str = "kira-gex.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog: Option<PathBuf>,
    pub permissions: Vec<String>,
    pub admin: bool,
}

impl ResolvedConfig {
    pub fn permission_context(&self) -> PermissionContext {
        if self.admin {
            PermissionContext::admin()
        } else {
            PermissionContext::new(self.permissions.iter().cloned())
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Explicit path, else `./kira-gex.json`, else the per-user config dir.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        match path {
            Some(path) => Self::load(Path::new(path)),
            None => Self::load_first(&Self::default_locations())?.ok_or(KiraError::MissingConfig),
        }
    }

    /// Like [`ConfigLoader::resolve`], but no config file anywhere is `None`.
    /// A config file that exists and cannot be read or parsed is still an error.
    pub fn resolve_optional(path: Option<&str>) -> Result<Option<ResolvedConfig>, KiraError> {
        match path {
            Some(path) => Self::load(Path::new(path)).map(Some),
            None => Self::load_first(&Self::default_locations()),
        }
    }

    /// Loads the first of `candidates` that exists.
    pub fn load_first(candidates: &[PathBuf]) -> Result<Option<ResolvedConfig>, KiraError> {
        candidates
            .iter()
            .find(|candidate| candidate.exists())
            .map(|path| Self::load(path))
            .transpose()
    }

    fn load(config_path: &Path) -> Result<ResolvedConfig, KiraError> {
        let content = fs::read_to_string(config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.to_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config, config_path.parent()))
    }

    /// Relative catalog paths are taken relative to `base`.
    pub fn resolve_config(config: Config, base: Option<&Path>) -> ResolvedConfig {
        let catalog = config.catalog.map(|catalog| match base {
            Some(base) if catalog.is_relative() => base.join(catalog),
            _ => catalog,
        });

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            catalog,
            permissions: config.permissions,
            admin: config.admin,
        }
    }

    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = BaseDirs::new() {
            locations.push(dirs.config_dir().join("kira-gex").join(CONFIG_FILE));
        }
        locations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default(), None);
        assert_eq!(resolved.schema_version, 1);
        assert!(resolved.catalog.is_none());
        assert!(!resolved.admin);
    }

    #[test]
    fn relative_catalog_follows_config_dir() {
        let config = Config {
            catalog: Some(PathBuf::from("catalog.json")),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config, Some(Path::new("/srv/gex")));
        assert_eq!(resolved.catalog, Some(PathBuf::from("/srv/gex/catalog.json")));
    }
}
