//! Request and response shapes exchanged between the gateway layers.
//!
//! Task payloads and response messages are opaque JSON: they are kept as
//! [`RawValue`]s so the bytes the caller or the upstream sent are relayed
//! without being re-ordered or re-formatted.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// The only content type accepted on `/task`.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Inbound task, decoded once per call and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    /// Host (optionally with path prefix) of the upstream to reach.
    pub target_host: String,
    /// Task body forwarded verbatim to the upstream.
    pub task_payload: Option<Box<RawValue>>,
    pub request_id: String,
    /// Inbound `X-Forwarded-For` chain with the peer address appended.
    pub client_address: String,
    pub authorization: String,
    pub content_type: String,
    /// Set by the `beta` query parameter; adds `beta=true` upstream.
    pub is_beta: bool,
}

/// The response envelope.
///
/// Either decoded from the upstream body or synthesised locally when a
/// call fails; `status` of zero and `error` of zero mean "absent".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResponse {
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub error: i64,
}

impl TaskResponse {
    /// Build a locally synthesised envelope: the status, its standard text
    /// as message, and a reason for the caller.
    pub fn synthesized(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .and_then(|text| json_string(text).ok()),
            reason: reason.into(),
            error: 0,
        }
    }
}

/// Reply of the monitoring `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

/// Reply of the monitoring `/version` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "goproxy", default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Encode `text` as a JSON string literal.
pub fn json_string(text: &str) -> Result<Box<RawValue>, serde_json::Error> {
    serde_json::value::to_raw_value(text)
}

fn is_zero_u16(value: &u16) -> bool {
    *value == 0
}

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}
