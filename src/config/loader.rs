//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;
use crate::config::schema::WebrouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<WebrouterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<WebrouterConfig, ConfigError> {
    let config: WebrouterConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load the file when given, otherwise start from defaults.
///
/// Defaults are not validated here; callers validate after applying overrides.
pub fn load_or_default(path: Option<&Path>) -> Result<WebrouterConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(WebrouterConfig::default()),
    }
}
