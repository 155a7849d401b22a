//! Configuration file handling.
//!
//! TOML config stored in the data directory. Only client-side settings live
//! here: the service endpoint and logging. Team state is never configured;
//! it is derived from the trusted roster store and the keyring.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use teamsync::api::http::DEFAULT_BASE_URL;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsyncConfig {
    /// Roster service settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the roster service
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_base_url() -> String {
    std::env::var("TEAMSYNC_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Default for TeamsyncConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TeamsyncConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: TeamsyncConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# teamsync configuration
#
# Keyring and trusted roster state live under the data directory:
#   {data_dir}

[api]
# Base URL of the roster service.
# Can also be overridden with the TEAMSYNC_API_URL environment variable.
base_url = "{base_url}"

[logging]
# Log level: trace, debug, info, warn, error
# The RUST_LOG environment variable takes precedence over this setting.
level = "info"
"#,
            data_dir = data_dir.display(),
            base_url = default_base_url(),
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        data_dir: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Default data directory, e.g. `~/.local/share/teamsync`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("teamsync")
}

/// Config file path inside a data directory.
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TeamsyncConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.api.base_url.is_empty());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = TeamsyncConfig::default();
        config.api.base_url = "https://roster.internal.example.com/v1".to_string();
        config.save(&config_path).unwrap();

        let loaded = TeamsyncConfig::load(&config_path).unwrap();
        assert_eq!(loaded.api.base_url, "https://roster.internal.example.com/v1");
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        TeamsyncConfig::create_default(&config_path, temp_dir.path()).unwrap();

        assert!(config_path.exists());
        let config = TeamsyncConfig::load(&config_path).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_config_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        // An empty config file is valid: every section has defaults.
        fs::write(&config_path, "").unwrap();

        let config = TeamsyncConfig::load(&config_path).unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(!config.api.base_url.is_empty());
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path(Path::new("/var/lib/teamsync"));
        assert_eq!(path, PathBuf::from("/var/lib/teamsync/config.toml"));
    }
}
