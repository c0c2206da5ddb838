//! Configuration management for the phone agent
//!
//! Supports loading configuration from:
//! - TOML/YAML files under `config/` (`default`, then the environment overlay)
//! - Environment variables (`PHONE_AGENT__` prefix, `__` between sections)
//!
//! Secrets fall back to the conventional variables (`SARVAM_API_KEY`,
//! `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER`, `BASE_URL`).

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, AudioConfig, ConversationConfig, ObservabilityConfig,
    PacerConfig, RuntimeEnvironment, SarvamConfig, SegmenterConfig, ServerConfig, Settings,
    TwilioConfig, VadConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingField(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
