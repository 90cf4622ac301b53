//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, limits, timeouts)
//! - Check that certificate material is configured
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::GatewayConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty"];

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
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

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = &config.listener;
    if listener.bind_host.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_host", "must not be empty"));
    }
    if listener.tls_port == 0 {
        errors.push(ValidationError::new("listener.tls_port", "must be non-zero"));
    }
    if listener.monitoring_port == 0 {
        errors.push(ValidationError::new("listener.monitoring_port", "must be non-zero"));
    }
    if listener.tls_port != 0 && listener.tls_port == listener.monitoring_port {
        errors.push(ValidationError::new(
            "listener.monitoring_port",
            "must differ from listener.tls_port",
        ));
    }
    if listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be non-zero"));
    }

    let tls = &config.tls;
    for (field, value) in [
        ("tls.server_cert_path", &tls.server_cert_path),
        ("tls.server_key_path", &tls.server_key_path),
        ("tls.ca_certs_dir", &tls.ca_certs_dir),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(field, "must be set"));
        }
    }

    let upstream = &config.upstream;
    if upstream.scheme != "https" && upstream.scheme != "http" {
        errors.push(ValidationError::new(
            "upstream.scheme",
            format!("unsupported scheme '{}'", upstream.scheme),
        ));
    }
    if upstream.port == 0 {
        errors.push(ValidationError::new("upstream.port", "must be non-zero"));
    }
    if upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be non-zero"));
    }
    if upstream.max_connections_per_host == 0 {
        errors.push(ValidationError::new(
            "upstream.max_connections_per_host",
            "must be non-zero",
        ));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if !LOG_FORMATS.contains(&observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", observability.log_format),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
