//! Configuration Module
//!
//! Handles application configuration loading, validation, and management.

mod types;

pub use types::{
    Config, LoggingConfig, MediaConfig, ReconnectConfig, ServerConfig, WhatsAppConfig,
};

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. System config: ~/.config/wabridge/config.toml
    /// 3. Local config: ./wabridge.toml
    /// 4. Environment variables
    pub fn load() -> Result<Self> {
        tracing::debug!("Loading configuration...");

        let mut config = Self::default();

        if let Some(system_config_path) = Self::system_config_path()
            && system_config_path.exists()
        {
            tracing::debug!("Loading system config from: {:?}", system_config_path);
            config = Self::load_file(&system_config_path)?;
        }

        let local_config_path = Self::local_config_path();
        if local_config_path.exists() {
            tracing::debug!("Loading local config from: {:?}", local_config_path);
            config = Self::load_file(&local_config_path)?;
        }

        config = Self::apply_env_overrides(config);

        tracing::debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from custom path: {:?}", path);

        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }
        let config = Self::apply_env_overrides(Self::load_file(path)?);

        tracing::debug!("Configuration loaded successfully from custom path");
        Ok(config)
    }

    /// Get the system config path: ~/.config/wabridge/config.toml
    pub fn system_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("wabridge").join("config.toml"))
    }

    fn local_config_path() -> PathBuf {
        PathBuf::from("./wabridge.toml")
    }

    /// A file replaces the previous layer wholesale; missing sections fall back to defaults.
    fn load_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    fn apply_env_overrides(config: Self) -> Self {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    fn apply_overrides(mut config: Self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(bind) = var("WABRIDGE_BIND") {
            config.server.bind = bind;
        }

        if let Some(port) = var("WABRIDGE_PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid WABRIDGE_PORT: {}", port),
            }
        }

        if let Some(dir) = var("WABRIDGE_SESSION_DIR") {
            config.whatsapp.session_dir = PathBuf::from(dir);
        }

        if let Some(dir) = var("WABRIDGE_MEDIA_DIR") {
            config.media.base_dir = PathBuf::from(dir);
        }

        if let Some(level) = var("WABRIDGE_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(dir) = var("WABRIDGE_LOG_DIR") {
            config.logging.dir = Some(PathBuf::from(dir));
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Validating configuration...");

        if self.server.bind.trim().is_empty() {
            anyhow::bail!("server.bind must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must not be 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let reconnect = &self.reconnect;
        if reconnect.max_attempts == 0 {
            anyhow::bail!("reconnect.max_attempts must be at least 1");
        }
        if reconnect.initial_delay_ms > reconnect.max_delay_ms {
            anyhow::bail!(
                "reconnect.initial_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                reconnect.initial_delay_ms,
                reconnect.max_delay_ms
            );
        }
        if reconnect.backoff_multiplier < 1.0 {
            anyhow::bail!("reconnect.backoff_multiplier must be >= 1.0");
        }

        if !self.media.base_dir.exists() {
            tracing::warn!(
                "Media base directory does not exist yet: {:?}",
                self.media.base_dir
            );
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Configuration saved to: {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.logging.level, "info");
        assert!(config.whatsapp.notify_on_ready);
        assert!(!config.whatsapp.print_qr_in_terminal);
        assert_eq!(config.reconnect.max_attempts, 10);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_backoff() {
        let mut config = Config::default();
        config.reconnect.initial_delay_ms = 90_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reconnect.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reconnect.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_content = r#"
[server]
port = 3001

[whatsapp]
session_dir = "/var/lib/wabridge/session"
notify_on_ready = false

[media]
base_dir = "/srv/public"

[reconnect]
max_attempts = 3
        "#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(
            config.whatsapp.session_dir,
            PathBuf::from("/var/lib/wabridge/session")
        );
        assert!(!config.whatsapp.notify_on_ready);
        assert_eq!(config.media.base_dir, PathBuf::from("/srv/public"));
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.initial_delay_ms, 1_000);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.server.port = 8088;

        config.save(temp_file.path()).unwrap();
        let loaded = Config::load_file(temp_file.path()).unwrap();

        assert_eq!(loaded.server.port, 8088);
        assert_eq!(loaded.logging.level, config.logging.level);
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        assert!(Config::load_from_path("/definitely/not/here.toml").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WABRIDGE_PORT", "4000"),
            ("WABRIDGE_MEDIA_DIR", "/data/media"),
            ("WABRIDGE_LOG_LEVEL", "debug"),
            ("WABRIDGE_LOG_DIR", "/var/log/wabridge"),
        ]
        .into_iter()
        .collect();

        let config = Config::apply_overrides(Config::default(), |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.media.base_dir, PathBuf::from("/data/media"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/wabridge")));
    }

    #[test]
    fn test_logging_dir_from_toml() {
        let config: Config = toml::from_str("[logging]\ndir = \"/var/log/wabridge\"\n").unwrap();
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/wabridge")));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let config = Config::apply_overrides(Config::default(), |key| {
            (key == "WABRIDGE_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_reconnect_retry_config() {
        let retry = ReconnectConfig::default().retry_config();
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(60));
        assert_eq!(retry.max_attempts, 10);
    }

    #[test]
    fn test_store_path_inside_session_dir() {
        let config = WhatsAppConfig {
            session_dir: PathBuf::from("/tmp/wa"),
            ..Default::default()
        };
        assert_eq!(config.store_path(), PathBuf::from("/tmp/wa/credentials.db"));
    }
}
