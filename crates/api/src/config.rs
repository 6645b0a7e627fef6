//! Application configuration
//!
//! Loaded from an optional TOML file, then `FATIGUE__*` environment
//! variables (`FATIGUE__SERVER__BIND_ADDR=0.0.0.0:9000`).

use crate::rate_limit::RateLimitConfig;
use alerting::AlertConfig;
use config::{Config, ConfigError, Environment, File};
use detector::DetectorConfig;
use serde::{Deserialize, Serialize};
use session_lifecycle::SessionConfig;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "fatigue.toml";

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub log_level: String,
    pub json_logs: bool,
    /// Serve with a mock detector when no model can be loaded
    pub mock_detector: bool,
    /// Request body limit for uploads (bytes)
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            mock_detector: false,
            max_body_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub detector: DetectorConfig,
    pub session: SessionConfig,
    pub alerting: AlertConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load from `path` (missing file is fine) and the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_FILE)).required(false))
            .add_source(
                Environment::with_prefix("FATIGUE")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("detector.model_dirs")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.session.validate().map_err(ConfigError::Message)?;
        Ok(config)
    }

    /// Session settings with the top-level alerting section applied
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            alerting: self.alerting.clone(),
            ..self.session.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.session.idle_timeout_secs, None);
        assert_eq!(config.detector.default_model, "best.onnx");
        assert_eq!(config.alerting.cooldown_seconds, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("fatigue-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fatigue.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind_addr = "127.0.0.1:9000"

[session]
idle_timeout_secs = 120

[alerting]
cooldown_seconds = 30
"#,
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.session.idle_timeout_secs, Some(120));
        assert_eq!(config.session_config().alerting.cooldown_seconds, 30);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_unrepresentable_idle_timeout() {
        let dir = std::env::temp_dir().join(format!("fatigue-config-idle-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fatigue.toml");
        std::fs::write(&path, "[session]\nidle_timeout_secs = 10000000000000000\n").unwrap();

        let err = AppConfig::load(path.to_str()).unwrap_err();
        assert!(err.to_string().contains("idle_timeout_secs"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
