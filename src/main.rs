//! Mutual-TLS task gateway.
//!
//! Accepts tasks from authenticated clients and relays each one to the
//! upstream service it names.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                  GATEWAY                     │
//!   Client (mTLS)       │  ┌───────────┐   ┌──────────┐   ┌─────────┐  │
//!   POST /task ─────────┼─▶│ task      │──▶│ pipeline │──▶│ upstream│──┼──▶ GET  /health
//!                       │  │ listener  │   │ validate │   │ client  │  │    POST /task
//!                       │  └───────────┘   │ observe  │   │ + limit │  │    Upstream
//!   Monitor (TLS)       │  ┌───────────┐   │ forward  │   └─────────┘  │    Service
//!   GET /health ────────┼─▶│monitoring │──▶│          │                │
//!   GET /version        │  │ listener  │   └──────────┘                │
//!                       │  └───────────┘                               │
//!                       │  config · logging · tls material · signals   │
//!                       └──────────────────────────────────────────────┘
//! ```

use std::process;

use clap::Parser;

use mtls_gateway::config::{resolve_config, Cli};
use mtls_gateway::gateway::{ForwardingService, Pipeline};
use mtls_gateway::http::GatewayServer;
use mtls_gateway::net::TlsMaterial;
use mtls_gateway::observability::init_logging;
use mtls_gateway::upstream::UpstreamClient;

#[tokio::main]
async fn main() {
    // axum-server may pull in a second rustls backend; pin ring.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mtls-gateway: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("mtls-gateway: failed to initialize logging: {e}");
        process::exit(1);
    }

    tracing::info!(version = %config.version, "mtls-gateway starting");
    tracing::info!(
        task_address = %config.listener.task_address(),
        monitoring_address = %config.listener.monitoring_address(),
        upstream_scheme = %config.upstream.scheme,
        upstream_port = config.upstream.port,
        upstream_timeout_secs = config.upstream.timeout_secs,
        "Configuration loaded"
    );

    let material = match TlsMaterial::load(&config.tls) {
        Ok(material) => material,
        Err(e) => log_and_exit("Failed to load TLS material", &e),
    };

    let client = match UpstreamClient::new(&config.upstream, &material.ca_certs) {
        Ok(client) => client,
        Err(e) => log_and_exit("Failed to build upstream client", &e),
    };

    let pipeline = Pipeline::new(ForwardingService::new(
        client,
        &config.upstream,
        config.version.clone(),
    ));

    let server = match GatewayServer::new(&config, pipeline, &material) {
        Ok(server) => server,
        Err(e) => log_and_exit("Failed to configure listeners", &e),
    };

    let termination = server.run().await;
    match termination.exit_code() {
        0 => tracing::info!(reason = %termination, "Gateway stopped"),
        _ => tracing::error!(reason = %termination, "Gateway stopped"),
    }
    process::exit(termination.exit_code());
}

fn log_and_exit(context: &str, error: &dyn std::error::Error) -> ! {
    tracing::error!(error = %error, "{context}");
    process::exit(1);
}
