//! Observability stage.
//!
//! # Responsibilities
//! - Emit one structured event per call: endpoint, correlation fields,
//!   resulting status, elapsed time, and the error chain on failure
//! - Recover panics raised below this stage and turn them into
//!   [`GatewayError::Panicked`], logged with a traceback taken at the
//!   panic site by a process-wide panic hook
//!
//! Apart from recovered panics the outcome leaves this stage exactly as it
//! entered.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::gateway::error::{envelope_status, error_chain, Failure, GatewayError};
use crate::gateway::model::TaskRequest;
use crate::gateway::pipeline::{CallContext, Handler, Operation, Outcome, Reply};

pub struct Observe<H> {
    next: H,
}

impl<H> Observe<H> {
    pub fn new(next: H) -> Self {
        install_panic_hook();
        Self { next }
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Record a backtrace on the panicking thread before it unwinds. The
/// previously installed hook still runs afterwards.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// The backtrace of the last panic on this thread, or the current stack
/// when no hook captured one.
fn take_panic_trace() -> Backtrace {
    PANIC_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(Backtrace::force_capture)
}

impl<H: Handler> Handler for Observe<H> {
    fn call(&self, ctx: CallContext, op: Operation) -> BoxFuture<'_, Outcome> {
        async move {
            let summary = CallSummary::new(&op, &self.next);
            let next_ctx = ctx.clone();
            let outcome = AssertUnwindSafe(async move { self.next.call(next_ctx, op).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(recovered(&summary, payload)));

            summary.record(&ctx, &outcome);
            outcome
        }
        .boxed()
    }

    fn target_url(&self, request: &TaskRequest) -> Option<String> {
        self.next.target_url(request)
    }
}

/// Correlation fields captured before the operation is handed down.
struct CallSummary {
    endpoint: &'static str,
    request_id: Option<String>,
    target: Option<String>,
    client_addr: Option<String>,
}

impl CallSummary {
    /// `target` is the full upstream URL when `next` can name it, the bare
    /// host otherwise.
    fn new<H: Handler>(op: &Operation, next: &H) -> Self {
        match op {
            Operation::Task(request) => Self {
                endpoint: op.endpoint(),
                request_id: Some(request.request_id.clone()),
                target: next
                    .target_url(request)
                    .or_else(|| Some(request.target_host.clone())),
                client_addr: Some(request.client_address.clone()),
            },
            Operation::Health | Operation::Version => Self {
                endpoint: op.endpoint(),
                request_id: None,
                target: None,
                client_addr: None,
            },
        }
    }
}

impl CallSummary {
    fn record(&self, ctx: &CallContext, outcome: &Outcome) {
        let took = ctx.received_at.elapsed();
        let status = outcome_status(outcome);

        match outcome {
            Ok(_) => tracing::info!(
                endpoint = self.endpoint,
                x_request_id = self.request_id.as_deref(),
                target = self.target.as_deref(),
                client_addr = self.client_addr.as_deref(),
                status,
                took = ?took,
                "Call completed"
            ),
            Err(failure) => tracing::error!(
                endpoint = self.endpoint,
                x_request_id = self.request_id.as_deref(),
                target = self.target.as_deref(),
                client_addr = self.client_addr.as_deref(),
                status,
                took = ?took,
                error = %error_chain(&failure.error),
                "Call failed"
            ),
        }
    }
}

fn recovered(summary: &CallSummary, payload: Box<dyn Any + Send>) -> Failure {
    let message = panic_message(payload.as_ref());
    let traceback = take_panic_trace();
    tracing::error!(
        endpoint = summary.endpoint,
        x_request_id = summary.request_id.as_deref(),
        panic = %message,
        traceback = %traceback,
        "Recovered panic"
    );
    Failure::from(GatewayError::Panicked(message))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// HTTP status the caller will see for `outcome`.
fn outcome_status(outcome: &Outcome) -> u16 {
    match outcome {
        Ok(Reply::Task(response)) => envelope_status(response.status).as_u16(),
        Ok(Reply::Health(_)) | Ok(Reply::Version(_)) => 200,
        Err(failure) => failure
            .response
            .as_ref()
            .map(|response| envelope_status(response.status).as_u16())
            .unwrap_or_else(|| failure.error.status_code().as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    use crate::gateway::model::{HealthStatus, TaskResponse};

    struct Panicking;

    fn explode() -> Outcome {
        panic!("upstream decoder exploded")
    }

    impl Handler for Panicking {
        fn call(&self, _ctx: CallContext, _op: Operation) -> BoxFuture<'_, Outcome> {
            async { explode() }.boxed()
        }
    }

    struct Rejecting;

    impl Handler for Rejecting {
        fn call(&self, _ctx: CallContext, _op: Operation) -> BoxFuture<'_, Outcome> {
            let response = TaskResponse::synthesized(StatusCode::BAD_GATEWAY, "Connection Refused");
            let failure = Failure::with_response(GatewayError::Internal, response);
            futures_util::future::ready(Err(failure)).boxed()
        }
    }

    struct Healthy;

    impl Handler for Healthy {
        fn call(&self, _ctx: CallContext, _op: Operation) -> BoxFuture<'_, Outcome> {
            futures_util::future::ready(Ok(Reply::Health(HealthStatus::ok()))).boxed()
        }
    }

    #[tokio::test]
    async fn panic_becomes_internal_failure() {
        let stage = Observe::new(Panicking);
        let failure = stage
            .call(CallContext::new(), Operation::Task(TaskRequest::default()))
            .await
            .unwrap_err();

        match &failure.error {
            GatewayError::Panicked(message) => assert_eq!(message, "upstream decoder exploded"),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(failure.error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(failure.response.is_none());
    }

    #[tokio::test]
    async fn failures_pass_through_unchanged() {
        let failure = Observe::new(Rejecting)
            .call(CallContext::new(), Operation::Task(TaskRequest::default()))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, GatewayError::Internal));
        let response = failure.response.unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(response.reason, "Connection Refused");
    }

    #[tokio::test]
    async fn replies_pass_through_unchanged() {
        let reply = Observe::new(Healthy)
            .call(CallContext::new(), Operation::Health)
            .await
            .unwrap();
        assert!(matches!(reply, Reply::Health(status) if status == HealthStatus::ok()));
    }

    struct Addressed;

    impl Handler for Addressed {
        fn call(&self, _ctx: CallContext, _op: Operation) -> BoxFuture<'_, Outcome> {
            futures_util::future::ready(Ok(Reply::Task(TaskResponse::default()))).boxed()
        }

        fn target_url(&self, request: &TaskRequest) -> Option<String> {
            Some(format!("https://{}:12000/task", request.target_host))
        }
    }

    fn task_to(target: &str) -> Operation {
        Operation::Task(TaskRequest {
            target_host: target.to_string(),
            ..TaskRequest::default()
        })
    }

    #[test]
    fn summary_names_the_full_upstream_url() {
        let summary = CallSummary::new(&task_to("svc.internal"), &Addressed);
        assert_eq!(summary.target.as_deref(), Some("https://svc.internal:12000/task"));

        let summary = CallSummary::new(&task_to("svc.internal"), &Healthy);
        assert_eq!(summary.target.as_deref(), Some("svc.internal"));

        let summary = CallSummary::new(&Operation::Version, &Addressed);
        assert_eq!(summary.target, None);
    }

    #[test]
    fn target_url_is_passed_through_the_stage() {
        let request = TaskRequest {
            target_host: "svc.internal".into(),
            ..TaskRequest::default()
        };
        assert_eq!(
            Observe::new(Addressed).target_url(&request).as_deref(),
            Some("https://svc.internal:12000/task")
        );
    }

    #[inline(never)]
    fn explode_in_place() {
        panic!("frame decoder exploded")
    }

    #[test]
    fn traceback_is_taken_at_the_panic_site() {
        install_panic_hook();
        assert!(std::panic::catch_unwind(explode_in_place).is_err());

        let traceback = take_panic_trace().to_string();
        assert!(traceback.contains("explode_in_place"), "{traceback}");
        // Consumed by the first read.
        assert!(PANIC_TRACE.with(|slot| slot.borrow().is_none()));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_message(&"static text"), "static text");
        assert_eq!(panic_message(&String::from("owned text")), "owned text");
        assert_eq!(panic_message(&42_u8), "unknown panic payload");
    }
}
