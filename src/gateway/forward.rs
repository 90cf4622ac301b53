//! Forwarding service.
//!
//! # Responsibilities
//! - Check `GET {scheme}://{target}:{port}/health` before every task
//! - Forward the task body to `POST {scheme}://{target}:{port}/task`,
//!   carrying the caller's auth, content type, forwarding chain and
//!   request id
//! - Decode the upstream body as the response envelope, passing its
//!   status through untouched
//! - Answer `/health` and `/version` locally
//!
//! # Design Decisions
//! - Exactly one attempt per call; a failed health check means no forward
//! - Health results are never cached, every task checks again
//! - Failures are classified once here and carried up unchanged

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use url::Url;

use crate::config::UpstreamConfig;
use crate::gateway::classify::{classify, ClassifiedError};
use crate::gateway::error::{Failure, GatewayError};
use crate::gateway::model::{HealthStatus, TaskRequest, TaskResponse, VersionInfo};
use crate::gateway::pipeline::{CallContext, Handler, Operation, Outcome, Reply};
use crate::upstream::{ReserveError, UpstreamClient};

pub const UPSTREAM_TASK_PATH: &str = "/task";
pub const UPSTREAM_HEALTH_PATH: &str = "/health";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

pub struct ForwardingService {
    client: UpstreamClient,
    scheme: String,
    port: u16,
    version: String,
}

impl ForwardingService {
    pub fn new(client: UpstreamClient, upstream: &UpstreamConfig, version: impl Into<String>) -> Self {
        Self {
            client,
            scheme: upstream.scheme.clone(),
            port: upstream.port,
            version: version.into(),
        }
    }

    /// `{scheme}://{target}:{port}`, the prefix of both upstream URLs.
    pub fn base_url(&self, target_host: &str) -> String {
        format!("{}://{}:{}", self.scheme, target_host, self.port)
    }

    /// Check the upstream's health, then forward the task to it.
    pub async fn forward(&self, request: &TaskRequest) -> Result<TaskResponse, Failure> {
        let body = serde_json::to_vec(&request.task_payload)
            .map_err(|e| synthesize(GatewayError::JsonMarshal(e)))?;

        let base = self.base_url(&request.target_host);
        self.check_health(&base)
            .await
            .map_err(|e| synthesize(GatewayError::UpstreamHealthCheckFailed(e)))?;

        let url = task_url(&base, request.is_beta)
            .map_err(|e| synthesize(GatewayError::FailedCreatingRequest(Box::new(e))))?;
        let headers = forwarded_headers(request)
            .map_err(|e| synthesize(GatewayError::FailedCreatingRequest(Box::new(e))))?;

        let _permit = self
            .client
            .reserve(&url)
            .await
            .map_err(|e| match e {
                ReserveError::TimedOut { .. } => synthesize(GatewayError::Upstream(classify(e))),
                ReserveError::Closed(_) => synthesize(GatewayError::Internal),
            })?;

        let response = self
            .client
            .http()
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| synthesize(GatewayError::Upstream(classify(e))))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| synthesize(GatewayError::ReadingResponseBody(Box::new(e))))?;

        decode_envelope(status, &bytes)
            .map_err(|e| synthesize(GatewayError::ReadingResponseBody(Box::new(e))))
    }

    /// Healthy iff the upstream answers its health endpoint with exactly 200.
    async fn check_health(&self, base: &str) -> Result<(), ClassifiedError> {
        let url = Url::parse(&format!("{base}{UPSTREAM_HEALTH_PATH}")).map_err(classify)?;
        let _permit = self.client.reserve(&url).await.map_err(classify)?;

        let response = self.client.http().get(url).send().await.map_err(classify)?;
        match response.status() {
            StatusCode::OK => Ok(()),
            other => {
                tracing::debug!(upstream = %base, status = %other, "Upstream health check failed");
                Err(ClassifiedError::unhealthy_status(other))
            }
        }
    }
}

impl Handler for ForwardingService {
    fn call(&self, _ctx: CallContext, op: Operation) -> BoxFuture<'_, Outcome> {
        async move {
            match op {
                Operation::Task(request) => self.forward(&request).await.map(Reply::Task),
                Operation::Health => Ok(Reply::Health(HealthStatus::ok())),
                Operation::Version => Ok(Reply::Version(VersionInfo {
                    version: self.version.clone(),
                })),
            }
        }
        .boxed()
    }

    fn target_url(&self, request: &TaskRequest) -> Option<String> {
        Some(format!(
            "{}{UPSTREAM_TASK_PATH}",
            self.base_url(&request.target_host)
        ))
    }
}

/// Pair `error` with the envelope the caller should receive for it.
fn synthesize(error: GatewayError) -> Failure {
    let response = TaskResponse::synthesized(error.status_code(), error.caller_reason());
    Failure::with_response(error, response)
}

fn task_url(base: &str, is_beta: bool) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{base}{UPSTREAM_TASK_PATH}"))?;
    if is_beta {
        url.query_pairs_mut().append_pair("beta", "true");
    }
    Ok(url)
}

/// The caller headers relayed upstream; empty values are not sent.
fn forwarded_headers(
    request: &TaskRequest,
) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (AUTHORIZATION, &request.authorization),
        (CONTENT_TYPE, &request.content_type),
        (HeaderName::from_static(FORWARDED_FOR_HEADER), &request.client_address),
        (HeaderName::from_static(REQUEST_ID_HEADER), &request.request_id),
    ] {
        if !value.is_empty() {
            headers.insert(name, HeaderValue::from_str(value)?);
        }
    }
    Ok(headers)
}

/// Decode an upstream body as the envelope. A body without `status`
/// reports the HTTP status it arrived with.
fn decode_envelope(status: StatusCode, body: &[u8]) -> Result<TaskResponse, serde_json::Error> {
    let mut response: TaskResponse = serde_json::from_slice(body)?;
    if response.status == 0 {
        response.status = status.as_u16();
    }
    Ok(response)
}
