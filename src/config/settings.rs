//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// First path segments claimed by the gateway's own endpoints
pub const RESERVED_SERVICE_NAMES: &[&str] =
    &["register", "unregister", "enable", "services", "health"];

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
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
    4000
}

/// Registry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Durable registry document; `None` or an empty path keeps the registry in memory only
    #[serde(default = "default_registry_path")]
    pub path: Option<String>,
    /// Service names known at startup, in addition to those already persisted
    #[serde(default)]
    pub services: Vec<String>,
}

fn default_registry_path() -> Option<String> {
    Some("./registry.json".to_string())
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            services: vec![],
        }
    }
}

/// Outbound forwarding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwarderConfig {
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_timeout() -> u64 {
    30000
}

fn default_connect_timeout() -> u64 {
    5000
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
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
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    ///
    /// The file location can be overridden with `GATEWAY_CONFIG`.
    pub fn load() -> Result<Self> {
        let path = std::env::var("GATEWAY_CONFIG")
            .unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_str().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Configuration path is not valid UTF-8".to_string(),
            ))
        })?;

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("forwarder.timeout_ms", default_timeout() as i64)?
            .set_default("forwarder.connect_timeout_ms", default_connect_timeout() as i64)?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            // Load from configuration file
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (prefixed with GATEWAY_)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("registry.services")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0".to_string()));
        }

        if self.forwarder.timeout_ms == 0 || self.forwarder.connect_timeout_ms == 0 {
            return Err(invalid("Forwarder timeouts must be greater than 0".to_string()));
        }

        for name in &self.registry.services {
            if name.is_empty() {
                return Err(invalid("Service name cannot be empty".to_string()));
            }
            if name.contains('/') {
                return Err(invalid(format!("Service name '{}' cannot contain '/'", name)));
            }
            if RESERVED_SERVICE_NAMES.contains(&name.as_str()) {
                return Err(invalid(format!(
                    "Service name '{}' is reserved by the gateway",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            registry: RegistryConfig::default(),
            forwarder: ForwarderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
