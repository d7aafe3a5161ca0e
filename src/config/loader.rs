//! Configuration Loader
//!
//! Environment-aware YAML loading. Discovers `vigil-config.yaml` in a
//! config directory, merges an optional `vigil-config.{environment}.yaml`
//! overlay on top, and validates the result.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_yaml::Value as YamlValue;
use tracing::{debug, info};

use super::VigilConfig;
use crate::error::{Result, VigilError};

const BASE_CONFIG_NAMES: [&str; 2] = ["vigil-config.yaml", "vigil-config.yml"];

/// Loaded configuration plus the environment it was resolved for
pub struct ConfigManager {
    config: VigilConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with an explicit
    /// environment. Useful for tests that must not touch process-global
    /// environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge(&config_directory, environment)?;
        config.validate()?;

        info!(environment = %environment, "Configuration loaded");

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment: VIGIL_ENV || APP_ENV || 'development'
    fn detect_environment() -> String {
        env::var("VIGIL_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// Load the base file, overlay the environment file if present, and
    /// deserialize. A missing base file yields pure defaults.
    fn load_and_merge(config_directory: &Path, environment: &str) -> Result<VigilConfig> {
        let base_path = BASE_CONFIG_NAMES
            .iter()
            .map(|name| config_directory.join(name))
            .find(|path| path.exists());

        let Some(base_path) = base_path else {
            debug!(
                directory = %config_directory.display(),
                "No configuration file found, using defaults"
            );
            return Ok(VigilConfig::default());
        };

        let mut yaml_data = Self::parse_file(&base_path)?;

        let overlay_path = config_directory.join(format!("vigil-config.{environment}.yaml"));
        if overlay_path.exists() {
            debug!(path = %overlay_path.display(), "Applying environment overlay");
            let overlay = Self::parse_file(&overlay_path)?;
            Self::merge_yaml_values(&mut yaml_data, overlay);
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            VigilError::Configuration(format!(
                "failed to deserialize {}: {e}",
                base_path.display()
            ))
        })
    }

    fn parse_file(path: &Path) -> Result<YamlValue> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VigilError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            VigilError::Configuration(format!("invalid YAML in {}: {e}", path.display()))
        })
    }

    /// Recursively merge overlay mappings into the base; scalars and
    /// sequences replace wholesale
    fn merge_yaml_values(base: &mut YamlValue, overlay: YamlValue) {
        match (&mut *base, overlay) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
                for (key, value) in overlay_map {
                    if let Some(existing) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, overlay_value) => {
                *base_ref = overlay_value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_yields_defaults() {
        let manager = ConfigManager::load_from_directory_with_env(
            Some(PathBuf::from("/nonexistent/config/dir")),
            "test",
        )
        .unwrap();

        assert_eq!(manager.environment(), "test");
        assert!(manager.config().connection.enabled);
    }

    #[test]
    fn test_environment_overlay_merges_deeply() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vigil-config.yaml"),
            r#"
connection:
  url: "ws://base.example.com/ws"
  max_reconnect_attempts: 3
loading:
  priority_delay_ms: 250
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("vigil-config.production.yaml"),
            r#"
connection:
  url: "wss://prod.example.com/ws"
"#,
        )
        .unwrap();

        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "production",
        )
        .unwrap();

        let config = manager.config();
        // Overlay replaces the url but keeps the base's sibling field.
        assert_eq!(config.connection.url, "wss://prod.example.com/ws");
        assert_eq!(config.connection.max_reconnect_attempts, 3);
        assert_eq!(config.loading.priority_delay_ms, 250);
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vigil-config.yaml"), "connection: [not a map").unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vigil-config.yaml"),
            r#"
circuit_breakers:
  default:
    failure_threshold: 0
"#,
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(VigilError::Configuration(_))));
    }
}
