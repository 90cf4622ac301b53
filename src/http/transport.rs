//! Transport adapter: HTTP requests in, pipeline operations out, and back.
//!
//! # Responsibilities
//! - Decode `POST /task` into a [`TaskRequest`]: JSON body, relayed
//!   headers, forwarding chain, `beta` query flag
//! - Encode every [`Outcome`] as a JSON body with a matching HTTP status
//! - Dispatch `/health` and `/version` through the same pipeline
//!
//! # Design Decisions
//! - The HTTP status of a task reply is the envelope's `status` when it is
//!   a known code that can carry a body, 500 otherwise; the numeric `error` field never decides it
//! - Decode failures are answered here and never reach the pipeline

use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::gateway::error::envelope_status;
use crate::gateway::forward::{FORWARDED_FOR_HEADER, REQUEST_ID_HEADER};
use crate::gateway::model::{json_string, TaskRequest, TaskResponse};
use crate::gateway::{Failure, GatewayError, Operation, Outcome, Pipeline, Reply};

/// Content type of every body the gateway writes.
pub const RESPONSE_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Shared state of both routers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub max_body_bytes: usize,
}

/// Body of `POST /task`.
#[derive(Debug, Deserialize)]
struct TaskBody {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    task: Option<Box<RawValue>>,
}

/// Wire form of a task reply. Field order is the order on the wire.
#[derive(Debug, Serialize)]
struct Envelope {
    status: u16,
    message: Box<RawValue>,
    #[serde(skip_serializing_if = "String::is_empty")]
    reason: String,
    #[serde(skip_serializing_if = "is_zero")]
    error: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

pub async fn task_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let decoded = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => decode_task_request(&parts, &bytes),
        Err(e) => Err(GatewayError::MalformedRequest(Box::new(e))),
    };

    match decoded {
        Ok(request) => encode_outcome(state.pipeline.dispatch(Operation::Task(request)).await),
        Err(error) => {
            tracing::info!(
                endpoint = "/task",
                path = %parts.uri.path(),
                reason = %error,
                "Task request could not be decoded"
            );
            encode_error(&error)
        }
    }
}

pub async fn health_handler(State(state): State<AppState>) -> Response {
    encode_outcome(state.pipeline.dispatch(Operation::Health).await)
}

pub async fn version_handler(State(state): State<AppState>) -> Response {
    encode_outcome(state.pipeline.dispatch(Operation::Version).await)
}

/// Build a [`TaskRequest`] from the request head and its complete body.
pub fn decode_task_request(parts: &Parts, body: &Bytes) -> Result<TaskRequest, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::EmptyRequestBody);
    }
    let decoded: TaskBody =
        serde_json::from_slice(body).map_err(|e| GatewayError::MalformedRequest(Box::new(e)))?;

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    Ok(TaskRequest {
        target_host: decoded.target.unwrap_or_default(),
        task_payload: decoded.task,
        request_id: header_text(&parts.headers, REQUEST_ID_HEADER),
        client_address: forwarded_for(&parts.headers, peer),
        authorization: header_text(&parts.headers, AUTHORIZATION.as_str()),
        content_type: header_text(&parts.headers, CONTENT_TYPE.as_str()),
        is_beta: beta_flag(parts.uri.query())?,
    })
}

fn header_text(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The inbound `X-Forwarded-For` chain with the peer IP appended.
///
/// Without a known peer the chain is left empty.
fn forwarded_for(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let Some(peer) = peer else {
        return String::new();
    };
    match header_text(headers, FORWARDED_FOR_HEADER) {
        prior if prior.is_empty() => peer.ip().to_string(),
        prior => format!("{prior},{}", peer.ip()),
    }
}

/// Value of the first `beta` query parameter; absent or empty means off.
fn beta_flag(query: Option<&str>) -> Result<bool, GatewayError> {
    let value = query
        .into_iter()
        .flat_map(|q| url::form_urlencoded::parse(q.as_bytes()))
        .find(|(key, _)| key == "beta")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();

    if value.is_empty() {
        return Ok(false);
    }
    parse_bool(&value).ok_or(GatewayError::InvalidBetaFlag(value))
}

/// Boolean spellings accepted for query flags.
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Turn a pipeline outcome into the HTTP response sent to the caller.
pub fn encode_outcome(outcome: Outcome) -> Response {
    match outcome {
        Ok(Reply::Task(response)) => encode_task_response(response),
        Ok(Reply::Health(status)) => json_response(StatusCode::OK, &status),
        Ok(Reply::Version(info)) => json_response(StatusCode::OK, &info),
        Err(Failure {
            response: Some(response),
            ..
        }) => encode_task_response(response),
        Err(Failure {
            error,
            response: None,
        }) => encode_error(&error),
    }
}

/// Encode an envelope, resolving its HTTP status.
pub fn encode_task_response(response: TaskResponse) -> Response {
    let status = envelope_status(response.status);
    let message = match response.message {
        Some(message) if message.get() != r#""""# => Some(message),
        _ => None,
    };

    let envelope = Envelope {
        status: status.as_u16(),
        message: message.unwrap_or_else(|| status_text(status)),
        reason: response.reason,
        error: response.error,
    };
    json_response(status, &envelope)
}

/// Encode an error that has no envelope of its own.
pub fn encode_error(error: &GatewayError) -> Response {
    let status = error.status_code();
    let envelope = Envelope {
        status: status.as_u16(),
        message: status_text(status),
        reason: error.caller_reason(),
        error: 0,
    };
    json_response(status, &envelope)
}

fn status_text(status: StatusCode) -> Box<RawValue> {
    json_string(status.canonical_reason().unwrap_or_default()).unwrap_or_default()
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(CONTENT_TYPE, HeaderValue::from_static(RESPONSE_CONTENT_TYPE))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::classify::classify;
    use crate::gateway::model::HealthStatus;
    use http_body_util::BodyExt;

    fn parts(uri: &str, headers: &[(&str, &str)], peer: Option<&str>) -> Parts {
        let mut builder = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(()).unwrap();
        if let Some(peer) = peer {
            request
                .extensions_mut()
                .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        }
        request.into_parts().0
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn decodes_body_and_relayed_headers() {
        let head = parts(
            "/task",
            &[
                ("content-type", "application/json"),
                ("authorization", "Bearer xyz"),
                ("x-request-id", "req-1"),
                ("x-forwarded-for", "10.0.0.1"),
            ],
            Some("192.168.1.5:40000"),
        );
        let body = Bytes::from_static(br#"{"target":"svc.internal","task":{"a": 1}}"#);
        let request = decode_task_request(&head, &body).unwrap();

        assert_eq!(request.target_host, "svc.internal");
        assert_eq!(request.task_payload.unwrap().get(), r#"{"a": 1}"#);
        assert_eq!(request.authorization, "Bearer xyz");
        assert_eq!(request.request_id, "req-1");
        assert_eq!(request.content_type, "application/json");
        assert_eq!(request.client_address, "10.0.0.1,192.168.1.5");
        assert!(!request.is_beta);
    }

    #[test]
    fn peer_alone_starts_the_chain() {
        let head = parts("/task", &[], Some("[::1]:9000"));
        let request = decode_task_request(&head, &Bytes::from_static(b"{}")).unwrap();
        assert_eq!(request.client_address, "::1");
        assert_eq!(request.target_host, "");
    }

    #[test]
    fn empty_and_malformed_bodies_are_rejected() {
        let head = parts("/task", &[], None);
        assert!(matches!(
            decode_task_request(&head, &Bytes::new()),
            Err(GatewayError::EmptyRequestBody)
        ));
        assert!(matches!(
            decode_task_request(&head, &Bytes::from_static(b"  \n")),
            Err(GatewayError::EmptyRequestBody)
        ));
        assert!(matches!(
            decode_task_request(&head, &Bytes::from_static(b"{\"target\":")),
            Err(GatewayError::MalformedRequest(_))
        ));
    }

    #[test]
    fn beta_flag_spellings() {
        assert!(!beta_flag(None).unwrap());
        assert!(!beta_flag(Some("beta=")).unwrap());
        assert!(beta_flag(Some("beta=true")).unwrap());
        assert!(beta_flag(Some("x=1&beta=T")).unwrap());
        assert!(!beta_flag(Some("beta=0&beta=1")).unwrap());
        assert!(matches!(
            beta_flag(Some("beta=yes")),
            Err(GatewayError::InvalidBetaFlag(value)) if value == "yes"
        ));
    }

    #[tokio::test]
    async fn task_reply_uses_envelope_status() {
        let response: TaskResponse =
            serde_json::from_str(r#"{"status":202,"message":{"ok":true},"error":9}"#).unwrap();
        let encoded = encode_outcome(Ok(Reply::Task(response)));

        assert_eq!(encoded.status(), StatusCode::ACCEPTED);
        assert_eq!(encoded.headers()[CONTENT_TYPE], RESPONSE_CONTENT_TYPE);
        assert_eq!(
            body_json(encoded).await,
            serde_json::json!({"status": 202, "message": {"ok": true}, "error": 9})
        );
    }

    #[tokio::test]
    async fn unknown_or_missing_status_becomes_500() {
        for body in [r#"{"status":799,"reason":"odd"}"#, r#"{"error":4}"#] {
            let response: TaskResponse = serde_json::from_str(body).unwrap();
            let encoded = encode_outcome(Ok(Reply::Task(response)));
            assert_eq!(encoded.status(), StatusCode::INTERNAL_SERVER_ERROR);

            let json = body_json(encoded).await;
            assert_eq!(json["status"], 500);
            assert_eq!(json["message"], "Internal Server Error");
        }
    }

    #[tokio::test]
    async fn bodiless_statuses_are_not_sent_as_final_status() {
        for code in [101, 204, 304] {
            let response = TaskResponse {
                status: code,
                ..TaskResponse::default()
            };
            let encoded = encode_outcome(Ok(Reply::Task(response)));
            assert_eq!(encoded.status(), StatusCode::INTERNAL_SERVER_ERROR, "{code}");
            assert_eq!(body_json(encoded).await["status"], 500);
        }
    }

    #[tokio::test]
    async fn failures_use_their_envelope() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = GatewayError::Upstream(classify(refused));
        let failure = Failure::with_response(
            GatewayError::Internal,
            TaskResponse::synthesized(error.status_code(), error.caller_reason()),
        );
        let encoded = encode_outcome(Err(failure));

        assert_eq!(encoded.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(encoded).await,
            serde_json::json!({"status": 502, "message": "Bad Gateway", "reason": "Connection Refused"})
        );
    }

    #[tokio::test]
    async fn bare_errors_are_encoded_from_the_error() {
        let encoded = encode_outcome(Err(Failure::from(GatewayError::InvalidContentType)));
        assert_eq!(encoded.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let json = body_json(encoded).await;
        assert_eq!(json["status"], 415);
        assert_eq!(json["message"], "Unsupported Media Type");
        assert_eq!(json["reason"], GatewayError::InvalidContentType.to_string());

        let encoded = encode_error(&GatewayError::Panicked("boom".into()));
        let json = body_json(encoded).await;
        assert_eq!(json["reason"], "internal server error");
    }

    #[tokio::test]
    async fn health_is_plain_json() {
        let encoded = encode_outcome(Ok(Reply::Health(HealthStatus::ok())));
        assert_eq!(encoded.status(), StatusCode::OK);
        assert_eq!(body_json(encoded).await, serde_json::json!({"status": "OK"}));
    }
}
