//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind host, ports, body limit).
    pub listener: ListenerConfig,

    /// Certificate material for both listeners and the upstream trust pool.
    pub tls: TlsConfig,

    /// The single upstream service tasks are forwarded to.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Version string reported by `/version`.
    pub version: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            tls: TlsConfig::default(),
            upstream: UpstreamConfig::default(),
            observability: ObservabilityConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host both listeners bind to (e.g., "0.0.0.0").
    pub bind_host: String,

    /// Port of the mutually-authenticated task listener.
    pub tls_port: u16,

    /// Port of the plain-TLS monitoring listener (`/health`, `/version`).
    pub monitoring_port: u16,

    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl ListenerConfig {
    /// Socket address string of the mutual-TLS listener.
    pub fn task_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.tls_port)
    }

    /// Socket address string of the monitoring listener.
    pub fn monitoring_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.monitoring_port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            tls_port: 443,
            monitoring_port: 5000,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// TLS material locations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the server certificate chain (PEM).
    pub server_cert_path: String,

    /// Path to the server private key (PEM).
    pub server_key_path: String,

    /// Directory of trusted CA bundles (PEM), walked recursively.
    pub ca_certs_dir: String,
}

/// Upstream service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// URL scheme used to reach the upstream ("https" or "http").
    pub scheme: String,

    /// Port appended to every target host.
    pub port: u16,

    /// Total time allowed for one outbound request, in seconds.
    pub timeout_secs: u64,

    /// Idle pooled connections kept by the outbound client.
    pub max_idle_connections: usize,

    /// Concurrent outbound connections allowed per upstream host.
    pub max_connections_per_host: usize,

    /// Seconds an idle pooled connection is kept open.
    pub idle_timeout_secs: u64,

    /// Skip verification of the upstream server certificate.
    pub insecure_skip_verify: bool,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            port: 12000,
            timeout_secs: 300,
            max_idle_connections: 50,
            max_connections_per_host: 5,
            idle_timeout_secs: 300,
            insecure_skip_verify: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format ("json" or "pretty").
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}
