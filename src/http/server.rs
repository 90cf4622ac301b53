//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the task router (`POST /task`) and the monitoring router
//!   (`GET /health`, `GET /version`)
//! - Wire up middleware: request ids, body limit, request spans
//! - Serve each router on its own TLS listener: mutual TLS for tasks,
//!   server-only TLS for monitoring
//! - Stop at the first listener failure or termination signal
//!
//! # Design Decisions
//! - Both routers share one pipeline and therefore one upstream pool
//! - Requests without an `x-request-id` get a generated UUID, which is
//!   relayed upstream and echoed back to the caller
//! - No graceful drain: in-flight calls end with the process

use std::io;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{GatewayConfig, ListenerConfig};
use crate::gateway::Pipeline;
use crate::http::transport::{health_handler, task_handler, version_handler, AppState};
use crate::lifecycle::{signals, Termination};
use crate::net::tls::{rustls_config, TlsError, TlsMaterial};

/// `service` field attached to every request span.
pub const SERVICE_NAME: &str = "mtls-gateway";

/// Error type for server setup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid listen address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Router for the task listener.
pub fn task_router(pipeline: Pipeline, listener: &ListenerConfig) -> Router {
    let state = AppState {
        pipeline,
        max_body_bytes: listener.max_body_bytes,
    };
    with_middleware(
        Router::new().route("/task", post(task_handler)).with_state(state),
        listener.max_body_bytes,
    )
}

/// Router for the monitoring listener.
pub fn monitoring_router(pipeline: Pipeline, listener: &ListenerConfig) -> Router {
    let state = AppState {
        pipeline,
        max_body_bytes: listener.max_body_bytes,
    };
    with_middleware(
        Router::new()
            .route("/health", get(health_handler))
            .route("/version", get(version_handler))
            .with_state(state),
        listener.max_body_bytes,
    )
}

fn with_middleware(router: Router, max_body_bytes: usize) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        service = SERVICE_NAME,
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(RequestBodyLimitLayer::new(max_body_bytes)),
    )
}

/// The two TLS listeners of the gateway.
pub struct GatewayServer {
    task_address: SocketAddr,
    monitoring_address: SocketAddr,
    task_tls: RustlsConfig,
    monitoring_tls: RustlsConfig,
    task_router: Router,
    monitoring_router: Router,
}

impl GatewayServer {
    pub fn new(
        config: &GatewayConfig,
        pipeline: Pipeline,
        material: &TlsMaterial,
    ) -> Result<Self, ServerError> {
        Ok(Self {
            task_address: parse_address(config.listener.task_address())?,
            monitoring_address: parse_address(config.listener.monitoring_address())?,
            task_tls: rustls_config(material.mutual_tls_config()?),
            monitoring_tls: rustls_config(material.server_tls_config()?),
            task_router: task_router(pipeline.clone(), &config.listener),
            monitoring_router: monitoring_router(pipeline, &config.listener),
        })
    }

    /// Serve both listeners until one of them fails or a termination
    /// signal arrives, and report which it was.
    pub async fn run(self) -> Termination {
        tokio::select! {
            result = serve("task", self.task_address, self.task_tls, self.task_router) => {
                Termination::Listener { name: "task", result }
            }
            result = serve(
                "monitoring",
                self.monitoring_address,
                self.monitoring_tls,
                self.monitoring_router,
            ) => {
                Termination::Listener { name: "monitoring", result }
            }
            signal = signals::wait_for_termination() => Termination::Signal(signal),
        }
    }
}

fn parse_address(address: String) -> Result<SocketAddr, ServerError> {
    address
        .parse()
        .map_err(|source| ServerError::Address { address, source })
}

async fn serve(
    name: &'static str,
    address: SocketAddr,
    tls: RustlsConfig,
    router: Router,
) -> io::Result<()> {
    tracing::info!(listener = name, address = %address, "Listening for connections");
    axum_server::bind_rustls(address, tls)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await
}
