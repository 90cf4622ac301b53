//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use mtls_gateway::config::{GatewayConfig, ListenerConfig, UpstreamConfig};
use mtls_gateway::gateway::{ForwardingService, Pipeline};
use mtls_gateway::http::{monitoring_router, task_router};
use mtls_gateway::upstream::UpstreamClient;

/// One `POST /task` as the mock upstream saw it.
#[derive(Debug, Clone)]
pub struct RecordedTask {
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
}

struct MockState {
    health_status: AtomicU16,
    task_status: AtomicU16,
    task_body: Mutex<String>,
    task_delay_ms: AtomicU64,
    health_delay_ms: AtomicU64,
    health_calls: AtomicUsize,
    tasks: Mutex<Vec<RecordedTask>>,
}

/// A programmable upstream service on plain HTTP.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockUpstream {
    /// Start an upstream that is healthy and answers every task with
    /// `{"status":200,"message":{"ok":true}}`.
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            health_status: AtomicU16::new(200),
            task_status: AtomicU16::new(200),
            task_body: Mutex::new(r#"{"status":200,"message":{"ok":true}}"#.to_string()),
            task_delay_ms: AtomicU64::new(0),
            health_delay_ms: AtomicU64::new(0),
            health_calls: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/health", get(mock_health))
            .route("/task", post(mock_task))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn set_health_status(&self, status: u16) {
        self.state.health_status.store(status, Ordering::SeqCst);
    }

    pub fn set_task_reply(&self, status: u16, body: &str) {
        self.state.task_status.store(status, Ordering::SeqCst);
        *self.state.task_body.lock().unwrap() = body.to_string();
    }

    pub fn set_task_delay(&self, delay: Duration) {
        self.state
            .task_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_health_delay(&self, delay: Duration) {
        self.state
            .health_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn health_calls(&self) -> usize {
        self.state.health_calls.load(Ordering::SeqCst)
    }

    pub fn tasks(&self) -> Vec<RecordedTask> {
        self.state.tasks.lock().unwrap().clone()
    }

    /// Upstream settings that reach this mock as target `127.0.0.1`.
    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            scheme: "http".to_string(),
            port: self.addr.port(),
            ..UpstreamConfig::default()
        }
    }
}

async fn mock_health(State(state): State<Arc<MockState>>) -> StatusCode {
    state.health_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.health_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    StatusCode::from_u16(state.health_status.load(Ordering::SeqCst)).unwrap()
}

async fn mock_task(
    State(state): State<Arc<MockState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.tasks.lock().unwrap().push(RecordedTask {
        headers,
        query,
        body,
    });

    let delay = state.task_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let status = StatusCode::from_u16(state.task_status.load(Ordering::SeqCst)).unwrap();
    let body = state.task_body.lock().unwrap().clone();
    (status, [("content-type", "application/json")], body).into_response()
}

/// Build the gateway pipeline for `upstream`.
pub fn pipeline(upstream: &UpstreamConfig) -> Pipeline {
    let client = UpstreamClient::new(upstream, &[]).unwrap();
    Pipeline::new(ForwardingService::new(client, upstream, "1.0.0-test"))
}

/// The gateway routers served over plain TCP, so tests can reach them
/// without client certificates.
pub struct PlainGateway {
    pub task_addr: SocketAddr,
    pub monitoring_addr: SocketAddr,
}

impl PlainGateway {
    pub async fn start(upstream: &UpstreamConfig) -> Self {
        let pipeline = pipeline(upstream);
        let listener = ListenerConfig::default();

        let task_addr = serve(task_router(pipeline.clone(), &listener)).await;
        let monitoring_addr = serve(monitoring_router(pipeline, &listener)).await;
        Self {
            task_addr,
            monitoring_addr,
        }
    }

    pub fn task_url(&self) -> String {
        format!("http://{}/task", self.task_addr)
    }

    pub fn monitoring_url(&self, path: &str) -> String {
        format!("http://{}{}", self.monitoring_addr, path)
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// A port nothing listens on at the moment of the call.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// A full gateway configuration using the test certificates.
pub fn tls_config(upstream: UpstreamConfig) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_host = "127.0.0.1".to_string();
    config.listener.tls_port = free_port();
    config.listener.monitoring_port = free_port();
    config.tls.server_cert_path = fixture("server.crt");
    config.tls.server_key_path = fixture("server.key");
    config.tls.ca_certs_dir = fixture("ca-dir");
    config.upstream = upstream;
    config
}

/// A plain HTTP client for the gateway's routers.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
