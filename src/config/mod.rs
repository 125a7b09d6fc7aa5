//! Configuration module

pub mod settings;

pub use settings::{ForwarderConfig, LoggingConfig, RegistryConfig, ServerConfig, Settings};
