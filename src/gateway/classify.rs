//! Classification of failed upstream exchanges.
//!
//! # Rules (first match wins)
//! - Timeout anywhere in the source chain → 504, "Request timeout"
//! - Text ending in a host-resolution failure → 400, "upstream host not found"
//! - Text ending in "connection refused" → 502, "Connection Refused"
//! - Anything else → 500 with no display message
//!
//! Classification is pure: it inspects the error and its sources and never
//! performs I/O.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use axum::http::StatusCode;

use crate::gateway::error::BoxError;

pub const TIMEOUT_MESSAGE: &str = "Request timeout";
pub const HOST_NOT_FOUND_MESSAGE: &str = "upstream host not found";
pub const CONNECTION_REFUSED_MESSAGE: &str = "Connection Refused";

/// Endings of resolver error texts that mean "the host does not exist".
const HOST_NOT_FOUND_SUFFIXES: &[&str] = &[
    "no such host",
    "name or service not known",
    "nodename nor servname provided, or not known",
    "no address associated with hostname",
    "temporary failure in name resolution",
    // The connector's wrapper around any resolver failure.
    "dns error",
];

const CONNECTION_REFUSED_SUFFIX: &str = "connection refused";

/// The normalized outcome of a failed network operation.
#[derive(Debug)]
pub struct ClassifiedError {
    /// Status reported to the caller; never zero.
    pub status: StatusCode,
    /// Caller-facing message, absent for the generic 500 case.
    pub display: Option<&'static str>,
    cause: Cause,
}

#[derive(Debug)]
enum Cause {
    Transport(BoxError),
    Unhealthy(StatusCode),
}

impl ClassifiedError {
    /// A health check that completed with a status other than 200.
    pub fn unhealthy_status(observed: StatusCode) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            display: None,
            cause: Cause::Unhealthy(observed),
        }
    }

    #[cfg(test)]
    pub(crate) fn unhealthy() -> Self {
        Self::unhealthy_status(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cause, self.display) {
            (Cause::Unhealthy(observed), _) => write!(f, "health check returned {observed}"),
            (Cause::Transport(_), Some(display)) => f.write_str(display),
            (Cause::Transport(_), None) => f.write_str("transport error"),
        }
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.cause {
            Cause::Transport(err) => Some(err.as_ref() as &(dyn StdError + 'static)),
            Cause::Unhealthy(_) => None,
        }
    }
}

/// Classify a transport failure into a caller-visible status and message.
pub fn classify(err: impl Into<BoxError>) -> ClassifiedError {
    let err = err.into();
    let (status, display) = if chain(err.as_ref()).any(is_timeout) {
        (StatusCode::GATEWAY_TIMEOUT, Some(TIMEOUT_MESSAGE))
    } else if chain(err.as_ref()).any(is_host_not_found) {
        (StatusCode::BAD_REQUEST, Some(HOST_NOT_FOUND_MESSAGE))
    } else if chain(err.as_ref()).any(is_connection_refused) {
        (StatusCode::BAD_GATEWAY, Some(CONNECTION_REFUSED_MESSAGE))
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, None)
    };

    ClassifiedError {
        status,
        display,
        cause: Cause::Transport(err),
    }
}

fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |current: &&'a (dyn StdError + 'static)| {
        (*current).source()
    })
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    if let Some(err) = err.downcast_ref::<reqwest::Error>() {
        return err.is_timeout();
    }
    if let Some(err) = err.downcast_ref::<io::Error>() {
        return err.kind() == io::ErrorKind::TimedOut;
    }
    err.is::<tokio::time::error::Elapsed>()
}

fn is_host_not_found(err: &(dyn StdError + 'static)) -> bool {
    let text = normalized_text(err);
    HOST_NOT_FOUND_SUFFIXES
        .iter()
        .any(|suffix| text.ends_with(suffix))
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    if let Some(err) = err.downcast_ref::<io::Error>() {
        if err.kind() == io::ErrorKind::ConnectionRefused {
            return true;
        }
    }
    normalized_text(err).ends_with(CONNECTION_REFUSED_SUFFIX)
}

/// Lower-cased error text with any trailing "(os error N)" removed.
fn normalized_text(err: &(dyn StdError + 'static)) -> String {
    let text = err.to_string().to_lowercase();
    let trimmed = match text.rfind(" (os error ") {
        Some(idx) if text.ends_with(')') => &text[..idx],
        _ => text.as_str(),
    };
    trimmed.trim_end().to_string()
}
