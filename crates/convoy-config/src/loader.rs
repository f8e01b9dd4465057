//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::Config;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    for rule in &config.triggers {
        if rule.stage.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "triggers[].stage must not be empty".to_string(),
            ));
        }
    }

    for spec in &config.plugins {
        if spec.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "plugins[].name must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}
