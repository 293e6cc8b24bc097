use std::net::SocketAddr;
use std::path::PathBuf;

use super::RepositoryConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("vellum.db")
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("vellum.toml")
    }

    /// Loads `vellum.toml` from the data directory. Relative store paths resolve against it.
    pub fn repository_config(&self) -> Result<RepositoryConfig> {
        let mut config = RepositoryConfig::load(self.config_path())?;
        if config.store.path.is_relative() {
            config.store.path = self.data_dir.join(&config.store.path);
        }
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_config_resolves_store_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let repo = config.repository_config().unwrap();
        assert_eq!(repo.store.path, config.db_path());
    }
}
