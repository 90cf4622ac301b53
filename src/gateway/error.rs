//! Gateway error taxonomy and its mapping onto HTTP status codes.
//!
//! Three classes exist: input-validation errors (400/415), upstream
//! reachability errors (status decided by the classifier), and internal
//! errors (always 500, rendered to callers with a generic reason).

use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;

use crate::gateway::classify::ClassifiedError;
use crate::gateway::model::TaskResponse;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Reason shown to callers for every internal-class error.
pub const INTERNAL_REASON: &str = "internal server error";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("internal server error")]
    Internal,

    #[error("invalid content type")]
    InvalidContentType,

    #[error("missing target URL in request body")]
    MissingTargetUrl,

    #[error("failed to parse json")]
    JsonMarshal(#[source] serde_json::Error),

    #[error("empty request body")]
    EmptyRequestBody,

    #[error("request not formed correctly")]
    MalformedRequest(#[source] BoxError),

    #[error("invalid beta query parameter '{0}'")]
    InvalidBetaFlag(String),

    #[error("empty response body")]
    ReadingResponseBody(#[source] BoxError),

    #[error("failed creating new request")]
    FailedCreatingRequest(#[source] BoxError),

    #[error("upstream health check failed")]
    UpstreamHealthCheckFailed(#[source] ClassifiedError),

    #[error("upstream request failed")]
    Upstream(#[source] ClassifiedError),

    #[error("recovered panic: {0}")]
    Panicked(String),
}

impl GatewayError {
    /// HTTP status for this error when no envelope was synthesised for it.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingTargetUrl
            | GatewayError::JsonMarshal(_)
            | GatewayError::EmptyRequestBody
            | GatewayError::MalformedRequest(_)
            | GatewayError::InvalidBetaFlag(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidContentType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::Internal
            | GatewayError::ReadingResponseBody(_)
            | GatewayError::FailedCreatingRequest(_)
            | GatewayError::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UpstreamHealthCheckFailed(classified)
            | GatewayError::Upstream(classified) => classified.status,
        }
    }

    /// Whether the error originates inside the gateway; such errors never
    /// expose their detail to the caller.
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Text placed in the `reason` field of the caller-visible envelope.
    pub fn caller_reason(&self) -> String {
        match self {
            // Reachability class even when the classifier settled on 500.
            GatewayError::UpstreamHealthCheckFailed(classified) => match classified.display {
                Some(display) => format!("{self}: {display}"),
                None => self.to_string(),
            },
            _ if self.is_internal() => INTERNAL_REASON.to_string(),
            GatewayError::Upstream(classified) => classified
                .display
                .map(str::to_string)
                .unwrap_or_else(|| INTERNAL_REASON.to_string()),
            _ => self.to_string(),
        }
    }
}

/// A failed pipeline call.
///
/// `error` is what the log sink sees; `response`, when present, is the
/// envelope synthesised for the caller at the point of failure.
#[derive(Debug)]
pub struct Failure {
    pub error: GatewayError,
    pub response: Option<TaskResponse>,
}

impl Failure {
    pub fn with_response(error: GatewayError, response: TaskResponse) -> Self {
        Self {
            error,
            response: Some(response),
        }
    }
}

impl From<GatewayError> for Failure {
    fn from(error: GatewayError) -> Self {
        Self {
            error,
            response: None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

/// Look up a numeric status, accepting only codes with a standard reason
/// phrase.
pub fn known_status(code: u16) -> Option<StatusCode> {
    StatusCode::from_u16(code)
        .ok()
        .filter(|status| status.canonical_reason().is_some())
}

/// HTTP status for an envelope `status`: a known code that can carry a
/// response body, 500 for anything else (absent, unknown, 1xx, 204, 205,
/// 304).
pub fn envelope_status(code: u16) -> StatusCode {
    known_status(code)
        .filter(|status| {
            !status.is_informational()
                && *status != StatusCode::NO_CONTENT
                && *status != StatusCode::RESET_CONTENT
                && *status != StatusCode::NOT_MODIFIED
        })
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Render an error with its full source chain, outermost first.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}
