use super::app_config::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, AppConfig};
use directories::ProjectDirs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    #[error("invalid page origin: {0}")]
    InvalidOrigin(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub struct StorageManager {
    config_dir: PathBuf,
}

impl StorageManager {
    /// Create a new `StorageManager`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration directory cannot be determined.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::ConfigDirNotFound)?;

        Ok(Self { config_dir })
    }

    /// Creates a `StorageManager` rooted at a specific directory.
    #[must_use]
    pub fn with_dir(path: PathBuf) -> Self {
        Self { config_dir: path }
    }

    /// Returns the configuration directory path.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Ensures the configuration directory exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the directory cannot be created.
    pub fn ensure_config_dir(&self) -> Result<(), ConfigError> {
        if !self.config_dir.exists() {
            info!(path = ?self.config_dir, "Creating configuration directory");
            fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Loads the application configuration, writing defaults on first run.
    ///
    /// An explicitly given file must exist and parse; a malformed default
    /// file is reported and replaced by defaults in memory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, or if an explicit
    /// file is missing or malformed.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        if let Some(path) = path_override {
            let content = fs::read_to_string(path)?;
            return Ok(toml::from_str::<AppConfig>(&content)?);
        }

        self.ensure_config_dir()?;
        let config_path = self.config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(path = ?config_path, "Config file not found, creating default");
            let default_config = AppConfig::default();
            Self::save_to_file(&config_path, &default_config)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str::<AppConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!(error = %e, "Failed to parse config file, using defaults");
                Ok(AppConfig::default())
            }
        }
    }

    fn save_to_file<T: serde::Serialize>(path: &Path, data: &T) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(data)?;

        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("Invalid path"))?;
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.persist(path).map_err(|e| e.error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::EnvironmentMode;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_config_dir_creates_directory() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("imgrelay");
        let manager = StorageManager::with_dir(config_path.clone());

        assert!(!config_path.exists());
        manager.ensure_config_dir().unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_load_config_creates_default_if_missing() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().to_path_buf());

        let config = manager.load_config(None).unwrap();
        assert_eq!(config.environment, EnvironmentMode::Hosted);

        let config_file = dir.path().join(CONFIG_FILE_NAME);
        assert!(config_file.exists());

        let reloaded = manager.load_config(None).unwrap();
        assert_eq!(reloaded.relay_path, config.relay_path);
        assert_eq!(reloaded.relay.bind_addr, config.relay.bind_addr);
    }

    #[test]
    fn test_load_config_handles_malformed_default_file() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().to_path_buf());
        let config_file = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&config_file, "allowed_hosts = [").unwrap();

        let config = manager.load_config(None).unwrap();
        assert!(config.allowed_hosts.is_empty());
        let content = fs::read_to_string(&config_file).unwrap();
        assert_eq!(content, "allowed_hosts = [");
    }

    #[test]
    fn test_explicit_file_must_parse() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().to_path_buf());
        let explicit = dir.path().join("custom.toml");

        assert!(matches!(
            manager.load_config(Some(&explicit)),
            Err(ConfigError::Io(_))
        ));

        fs::write(&explicit, "environment = \"sideways\"").unwrap();
        assert!(matches!(
            manager.load_config(Some(&explicit)),
            Err(ConfigError::TomlDe(_))
        ));

        fs::write(&explicit, "allowed_hosts = [\"storage.example\"]").unwrap();
        let config = manager.load_config(Some(&explicit)).unwrap();
        assert_eq!(config.allowed_hosts, ["storage.example"]);
    }
}
