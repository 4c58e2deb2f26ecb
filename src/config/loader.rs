//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers `base.toml`, an optional
//! `<environment>.toml` and `IRRIGATION__*` environment variables, then
//! validates the result once.

use super::error::{ConfigResult, ConfigurationError};
use super::IrrigationConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const BASE_FILE: &str = "base.toml";
const ENV_PREFIX: &str = "IRRIGATION";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: IrrigationConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_layered_config(&config_directory, environment)?;
        Self::from_config(config, environment, config_directory)
    }

    /// Wrap an already-built configuration (validated here)
    pub fn from_config(
        config: IrrigationConfig,
        environment: &str,
        config_directory: PathBuf,
    ) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;

        for warning in config.validation_warnings() {
            warn!(environment = environment, "⚠️ Configuration warning: {}", warning);
        }

        let sanitized_config = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized_config)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = environment,
            fields = config.fields.len(),
            breaker_scope = ?config.circuit_breaker.scope,
            soil_depth_cm = config.soil.depth_cm,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &IrrigationConfig {
        &self.config
    }

    /// Sanitized configuration for debug output
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Resolve a path relative to the configuration directory's parent
    pub fn resolve_path<P: AsRef<Path>>(&self, relative_path: P) -> PathBuf {
        let relative_path = relative_path.as_ref();
        if relative_path.is_absolute() {
            return relative_path.to_path_buf();
        }
        self.config_directory
            .parent()
            .unwrap_or(&self.config_directory)
            .join(relative_path)
    }

    fn load_layered_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<IrrigationConfig> {
        let base_path = config_directory.join(BASE_FILE);
        if !base_path.is_file() {
            return Err(ConfigurationError::config_file_not_found(vec![base_path]));
        }

        let env_path = config_directory.join(format!("{environment}.toml"));
        if env_path.is_file() {
            debug!("Applying environment overrides from {}", env_path.display());
        }

        let layered = Config::builder()
            .add_source(File::from(base_path.clone()).format(FileFormat::Toml))
            .add_source(
                File::from(env_path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        layered
            .try_deserialize::<IrrigationConfig>()
            .map_err(|e| ConfigurationError::invalid_toml(base_path.display().to_string(), e))
    }

    /// Sanitize configuration for safe logging by masking sensitive fields
    fn sanitize_config_for_logging(config: &IrrigationConfig) -> serde_json::Value {
        let mut config_json = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);

        let sensitive_patterns = ["password", "secret", "key", "token", "credential", "auth"];

        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);

        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();

                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = Self::mask_value(val);
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    fn mask_value(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) if s.is_empty() => {
                serde_json::Value::String("[EMPTY]".to_string())
            }
            serde_json::Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let masked = if chars.len() > 4 {
                    let head: String = chars[..2].iter().collect();
                    let tail: String = chars[chars.len() - 2..].iter().collect();
                    format!("{head}***{tail}")
                } else {
                    "***".to_string()
                };
                serde_json::Value::String(format!("[MASKED: {masked}]"))
            }
            serde_json::Value::Number(n) => serde_json::Value::String(format!("[MASKED: {n}]")),
            _ => serde_json::Value::String("[MASKED]".to_string()),
        }
    }

    /// IRRIGATION_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("IRRIGATION_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `IRRIGATION_CONFIG_DIR`, else `./config`
    fn default_config_directory() -> PathBuf {
        env::var("IRRIGATION_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_toml() -> &'static str {
        r#"
default_field_id = "1810564865283239936"

[sensor_api]
base_url = "https://sensors.example.com/zlapi/"
api_key = "test_api_key_value"

[retry]
max_attempts = 3
backoff_base_seconds = 1.0

[circuit_breaker]
failure_threshold = 5
recovery_timeout_seconds = 60

[soil]
depth_cm = 30

[decision]
irrigation_threshold = 0.6
rain_forecast_days = 3

[[fields]]
field_id = "1810564865283239936"
device_id = "61725612366342"
field_name = "F1"
use_manual_soil_params = true
soil_params = { sat = 35.5, fc = 25.0, pwp = 15.2 }

[[fields]]
field_id = "1810565402921709568"
device_id = "61725612366235"
field_name = "F2"
sat_pwp_period = { start_date = "2025-08-01" }
fc_period = { start_date = "2025-11-16", end_date = "2025-11-17" }
"#
    }

    fn setup_test_config_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().to_path_buf();
        fs::write(config_dir.join(BASE_FILE), create_test_config_toml()).unwrap();
        (temp_dir, config_dir)
    }

    #[test]
    fn test_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::load_from_directory_with_env(
            Some(temp_dir.path().to_path_buf()),
            "test",
        );

        if let Err(ConfigurationError::ConfigFileNotFound { searched_paths }) = result {
            assert_eq!(searched_paths.len(), 1);
        } else {
            panic!("Expected ConfigFileNotFound error");
        }
    }

    #[test]
    fn test_basic_config_loading() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "test").unwrap();

        let config = manager.config();
        assert_eq!(manager.environment(), "test");
        assert_eq!(config.fields.len(), 2);
        assert_eq!(
            config.device_for_field("1810565402921709568").unwrap(),
            "61725612366235"
        );
        assert_eq!(
            config.fields[0].manual_parameters(),
            Some((35.5, 25.0, 15.2))
        );
        assert!(config.fields[1].sat_pwp_period.as_ref().unwrap().end_date.is_none());
        // untouched sections keep their defaults
        assert_eq!(config.decision.max_single_irrigation, 30.0);
        assert_eq!(config.growth.header_skip_lines, 10);
    }

    #[test]
    fn test_environment_specific_overrides() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        fs::write(
            config_dir.join("production.toml"),
            "[circuit_breaker]\nrecovery_timeout_seconds = 120\nscope = \"per_device\"\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "production")
                .unwrap();
        assert_eq!(
            manager.config().circuit_breaker.recovery_timeout_seconds,
            120.0
        );
        assert_eq!(
            manager.config().circuit_breaker.scope,
            super::super::BreakerScope::PerDevice
        );

        let development =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "development").unwrap();
        assert_eq!(
            development.config().circuit_breaker.recovery_timeout_seconds,
            60.0
        );
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(BASE_FILE),
            "[sensor_api]\napi_key = \"k\"\n\n[retry]\nmax_attempts = 0\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(temp_dir.path().to_path_buf()), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_config_sanitization() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir), "test").unwrap();

        let sanitized = manager.debug_config();

        let api_key = sanitized
            .get("sensor_api")
            .and_then(|api| api.get("api_key"))
            .and_then(|k| k.as_str())
            .unwrap();
        assert!(api_key.contains("[MASKED:"), "got: {api_key}");
        assert!(api_key.contains("te***ue"), "got: {api_key}");

        let base_url = sanitized
            .get("sensor_api")
            .and_then(|api| api.get("base_url"))
            .and_then(|u| u.as_str());
        assert_eq!(base_url, Some("https://sensors.example.com/zlapi/"));

        assert_eq!(manager.config().sensor_api.api_key, "test_api_key_value");
    }

    #[test]
    fn test_resolve_path() {
        let (_temp_dir, config_dir) = setup_test_config_dir();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(config_dir.clone()), "test").unwrap();

        let resolved = manager.resolve_path("data/model_output/wheat.out");
        assert_eq!(
            resolved,
            config_dir.parent().unwrap().join("data/model_output/wheat.out")
        );

        let absolute = PathBuf::from("/tmp/wheat.out");
        assert_eq!(manager.resolve_path(&absolute), absolute);
    }

    #[test]
    fn test_shipped_base_config_matches_retry_defaults() {
        let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("config")
            .join(BASE_FILE);
        let shipped: IrrigationConfig = Config::builder()
            .add_source(File::from(base).format(FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let defaults = IrrigationConfig::default();
        assert_eq!(shipped.retry, defaults.retry);
        assert_eq!(shipped.retry.timeout_seconds, 15.0);
        assert_eq!(shipped.circuit_breaker, defaults.circuit_breaker);
    }
}
