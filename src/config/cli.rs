//! Command-line surface.
//!
//! Every flag is optional; a flag that is present overrides the value from
//! the configuration file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Parser)]
#[command(name = "mtls-gateway")]
#[command(about = "Mutual-TLS task forwarding gateway", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port of the mutual-TLS task listener
    #[arg(long)]
    pub tls_port: Option<u16>,

    /// Port of the monitoring listener
    #[arg(long)]
    pub monitoring_port: Option<u16>,

    /// Port the upstream service listens on
    #[arg(long)]
    pub upstream_port: Option<u16>,

    /// Directory of trusted Certificate Authorities
    #[arg(long)]
    pub ca_certs_dir: Option<String>,

    /// Path of the server certificate
    #[arg(long)]
    pub server_cert_path: Option<String>,

    /// Path of the server private key
    #[arg(long)]
    pub server_key_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Copy every flag that was given onto `config`.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(port) = self.tls_port {
            config.listener.tls_port = port;
        }
        if let Some(port) = self.monitoring_port {
            config.listener.monitoring_port = port;
        }
        if let Some(port) = self.upstream_port {
            config.upstream.port = port;
        }
        if let Some(dir) = &self.ca_certs_dir {
            config.tls.ca_certs_dir = dir.clone();
        }
        if let Some(path) = &self.server_cert_path {
            config.tls.server_cert_path = path.clone();
        }
        if let Some(path) = &self.server_key_path {
            config.tls.server_key_path = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}
