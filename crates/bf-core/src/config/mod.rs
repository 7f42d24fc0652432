//! Configuration management for botfleet

mod fleet;
pub mod serde_utils;

pub use fleet::{ApiConfig, FleetConfig, SourceConfig, SupervisorConfig, WorkerConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("botfleet")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "service_name = \"fleet-a\"\n\n[supervisor]\nmax_failed_start_attempts = 7\n",
        )
        .unwrap();

        let loaded: FleetConfig = load_config(&path).unwrap();
        assert_eq!(loaded.service_name, "fleet-a");
        assert_eq!(loaded.supervisor.max_failed_start_attempts, 7);
        assert_eq!(loaded.reload_interval, FleetConfig::default().reload_interval);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "service_name = [").unwrap();
        let result: Result<FleetConfig, _> = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<FleetConfig, _> = load_config(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_default_path_is_under_botfleet() {
        assert!(default_config_path().ends_with("botfleet/config.toml"));
    }
}
