//! Configuration file loading and validation.

use probe::Config;
use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

impl From<ConfigError> for common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::IoError(e) => common::Error::Io(e),
            other => common::Error::config(other),
        }
    }
}

/// Load configuration from a specific file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    tracing::info!("Loading configuration from: {}", path.as_ref().display());
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse(&contents)
}

/// Parse and validate configuration text.
pub fn parse(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(contents)?;
    validate(&config)?;
    Ok(config)
}

/// Unknown prober names and malformed patterns are left for probe time, so
/// only module timeouts are checked here.
pub fn validate(config: &Config) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for (name, module) in &config.modules {
        if let Err(mut e) = validate_timeout(&module.timeout) {
            e.add_param(Cow::from("module"), name);
            errors.add("timeout", e);
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// A zero timeout would fail every probe before it starts.
fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if timeout.is_zero() {
        return Err(ValidationError::new("timeout_zero"));
    }
    Ok(())
}
