//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WebrouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use crate::config::schema::WebrouterConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &WebrouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_host_port(&config.registry.address) {
        errors.push(ValidationError::new(
            "registry.address",
            format!("expected host:port, got '{}'", config.registry.address),
        ));
    }
    if !config.registry.path.starts_with('/') {
        errors.push(ValidationError::new("registry.path", "must start with '/'"));
    }
    if config.registry.reconnect_delay_ms == 0 {
        errors.push(ValidationError::new("registry.reconnect_delay_ms", "must be > 0"));
    }

    if !is_host_port(&config.consul.address) {
        errors.push(ValidationError::new(
            "consul.address",
            format!("expected host:port, got '{}'", config.consul.address),
        ));
    }
    if config.consul.prefix.is_empty() {
        errors.push(ValidationError::new("consul.prefix", "must not be empty"));
    }

    if config.retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be >= 1"));
    }
    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.base_delay_ms",
            "must not exceed retry.max_delay_ms",
        ));
    }

    if config.nginx.server_name.trim().is_empty() {
        errors.push(ValidationError::new("nginx.server_name", "must not be empty"));
    }

    let graphite = &config.observability.graphite;
    if graphite.enabled {
        if graphite.host.is_empty() {
            errors.push(ValidationError::new(
                "observability.graphite.host",
                "required when graphite is enabled",
            ));
        }
        if graphite.interval_secs == 0 {
            errors.push(ValidationError::new(
                "observability.graphite.interval_secs",
                "must be > 0",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
