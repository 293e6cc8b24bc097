use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ResourceType;

/// Repository settings, read from `vellum.toml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    /// Members of this group bypass ACL evaluation.
    pub administrators_group: String,
    /// Root path prefixes whose resources get the labeled flag when siblings cross them.
    pub labeled_sites: Vec<String>,
    /// Types only administrators may write.
    pub executable_types: Vec<ResourceType>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            administrators_group: "Administrators".to_string(),
            labeled_sites: Vec::new(),
            executable_types: vec![ResourceType::Jsp],
        }
    }
}

impl RepositoryConfig {
    /// Loads the configuration at `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// A configuration backed by a private in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            store: StoreConfig {
                driver: "memory".to_string(),
                path: PathBuf::new(),
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_executable(&self, resource_type: ResourceType) -> bool {
        self.executable_types.contains(&resource_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Registry key of the store implementation: `sqlite` or `memory`.
    pub driver: String,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: PathBuf::from("vellum.db"),
        }
    }
}

/// Capacity of each cache partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub users: usize,
    pub groups: usize,
    pub memberships: usize,
    pub projects: usize,
    pub resources: usize,
    pub listings: usize,
    pub properties: usize,
    pub acls: usize,
    pub permissions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            users: 50,
            groups: 50,
            memberships: 100,
            projects: 20,
            resources: 2500,
            listings: 1000,
            properties: 5000,
            acls: 1000,
            permissions: 10000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Versions kept per resource. 0 keeps every version.
    pub max_versions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_versions: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RepositoryConfig::load(dir.path().join("vellum.toml")).unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert!(config.is_executable(ResourceType::Jsp));
    }

    #[test]
    fn test_partial_toml() {
        let config = RepositoryConfig::from_toml(
            r#"
            labeled_sites = ["/sites/"]
            executable_types = ["jsp", "pointer"]

            [store]
            driver = "memory"

            [history]
            max_versions = 3

            [cache]
            permissions = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.store.driver, "memory");
        assert_eq!(config.store.path, PathBuf::from("vellum.db"));
        assert_eq!(config.history.max_versions, 3);
        assert!(config.history.enabled);
        assert_eq!(config.cache.permissions, 42);
        assert_eq!(config.cache.acls, 1000);
        assert_eq!(config.labeled_sites, vec!["/sites/"]);
        assert!(config.is_executable(ResourceType::Pointer));
        assert_eq!(config.administrators_group, "Administrators");
    }

    #[test]
    fn test_invalid_toml() {
        let err = RepositoryConfig::from_toml("store = 5").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
