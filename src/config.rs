//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::hub::{DrainPolicy, HubConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("switchyard").join("config.toml")),
            Some(PathBuf::from("/etc/switchyard/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Hub overrides
        if let Some(capacity) = env_parse("SWITCHYARD_QUEUE_CAPACITY") {
            self.hub.queue_capacity = capacity;
        }
        if let Some(capacity) = env_parse("SWITCHYARD_CONTROL_CAPACITY") {
            self.hub.control_capacity = capacity;
        }
        if let Ok(policy) = std::env::var("SWITCHYARD_DRAIN_POLICY") {
            match policy.to_lowercase().as_str() {
                "service" => self.hub.drain_policy = DrainPolicy::Service,
                "reject" => self.hub.drain_policy = DrainPolicy::Reject,
                other => tracing::warn!("Ignoring unknown drain policy {:?}", other),
            }
        }

        // Server overrides
        if let Ok(host) = std::env::var("SWITCHYARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("SWITCHYARD_PORT") {
            self.server.port = port;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("SWITCHYARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SWITCHYARD_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Switchyard Configuration
#
# Environment variables override these settings:
# - SWITCHYARD_QUEUE_CAPACITY
# - SWITCHYARD_CONTROL_CAPACITY
# - SWITCHYARD_DRAIN_POLICY
# - SWITCHYARD_HOST
# - SWITCHYARD_PORT
# - SWITCHYARD_LOG_LEVEL
# - SWITCHYARD_LOG_FORMAT

[hub]
# Envelopes buffered per client before it is disconnected as a slow consumer
queue_capacity = 10

# Capacity of the hub's internal command queue
control_capacity = 256

# While shutting down: "service" keeps handling joins and sends,
# "reject" refuses new clients and drops sends
drain_policy = "service"

[server]
# Server host
host = "0.0.0.0"

# Server port
port = 8090

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hub, HubConfig::default());
        assert_eq!(config.server.addr(), "0.0.0.0:8090");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.hub, HubConfig::default());
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[hub]
queue_capacity = 64
drain_policy = "reject"

[server]
port = 9000
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.hub.queue_capacity, 64);
        assert_eq!(config.hub.control_capacity, 256);
        assert_eq!(config.hub.drain_policy, DrainPolicy::Reject);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_errors() {
        let missing = Config::load(Path::new("/nonexistent/switchyard.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[hub\nqueue_capacity = ").unwrap();
        let invalid = Config::load(file.path());
        assert!(matches!(invalid, Err(ConfigError::Parse { .. })));
    }
}
