// Configuration File Support
//
// TOML configuration for portal-throttle with environment variable overrides.
// Configuration files are loaded from the XDG config directory:
// ~/.config/portal-throttle/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. A missing file yields the defaults (with
    /// environment overrides applied).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            let config = Self::default().apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        let config = config.apply_env_overrides();
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/portal-throttle/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "portal-throttle", "portal-throttle")
        {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("portal-throttle")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - PORTAL_THROTTLE_LOG_LEVEL
    /// - PORTAL_THROTTLE_LOG_FORMAT
    /// - PORTAL_THROTTLE_RATE_LIMIT_ENABLED
    /// - PORTAL_THROTTLE_MAX_KEYS
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("PORTAL_THROTTLE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PORTAL_THROTTLE_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.rate_limit = self.rate_limit.apply_env_overrides();
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.rate_limit
            .validate()
            .context("Invalid rate_limit section")?;

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::ActionLimit;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "compact");
        assert!(config.rate_limit.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_action() {
        let mut config = Config::default();
        config
            .rate_limit
            .actions
            .insert("broken".to_string(), ActionLimit::new(0, 1000));
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.rate_limit.actions, Config::default().rate_limit.actions);
    }

    #[test]
    fn test_load_valid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[rate_limit]
enabled = true
max_keys = 500
idle_ttl_windows = 4

[rate_limit.actions.sendMessage]
limit = 3
window_ms = 1000

[rate_limit.actions.exportReport]
limit = 1
window_ms = 3600000
"#;
        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.rate_limit.max_keys, Some(500));
        assert_eq!(config.rate_limit.idle_ttl_windows, 4);
        assert_eq!(
            config.rate_limit.action("sendMessage").unwrap(),
            ActionLimit::new(3, 1000)
        );
        assert_eq!(
            config.rate_limit.action("exportReport").unwrap(),
            ActionLimit::new(1, 3_600_000)
        );
        // An explicit table replaces the defaults
        assert!(config.rate_limit.action("createLead").is_err());
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_load_partial_toml_keeps_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[logging]\nformat = \"pretty\"\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.rate_limit, RateLimitConfig::default().apply_env_overrides());
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[rate_limit\nenabled = ").unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unbounded_max_keys_survives_reload() {
        let mut config = Config::default();
        config.rate_limit.max_keys = None;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), config.to_toml().unwrap()).unwrap();

        let parsed: Config = toml::from_str(&fs::read_to_string(temp_file.path()).unwrap()).unwrap();
        assert_eq!(parsed.rate_limit.max_keys, None);
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_path_file_name() {
        assert!(Config::config_path().ends_with("config.toml"));
    }
}
