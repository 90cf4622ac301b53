//! Request validation stage.
//!
//! Rejects malformed task requests before they reach the rest of the chain,
//! so a rejected request never causes an upstream call.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::gateway::error::{Failure, GatewayError};
use crate::gateway::model::{TaskRequest, JSON_CONTENT_TYPE};
use crate::gateway::pipeline::{CallContext, Handler, Operation, Outcome};

/// Check a task request, returning the error it is rejected with.
pub fn validate(request: &TaskRequest) -> Result<(), GatewayError> {
    if request.content_type != JSON_CONTENT_TYPE {
        return Err(GatewayError::InvalidContentType);
    }
    if request.target_host.is_empty() {
        return Err(GatewayError::MissingTargetUrl);
    }
    Ok(())
}

pub struct Validate<H> {
    next: H,
}

impl<H> Validate<H> {
    pub fn new(next: H) -> Self {
        Self { next }
    }
}

impl<H: Handler> Handler for Validate<H> {
    fn call(&self, ctx: CallContext, op: Operation) -> BoxFuture<'_, Outcome> {
        if let Operation::Task(request) = &op {
            if let Err(error) = validate(request) {
                tracing::info!(
                    endpoint = op.endpoint(),
                    x_request_id = %request.request_id,
                    client_addr = %request.client_address,
                    reason = %error,
                    "Task request rejected"
                );
                return futures_util::future::ready(Err(Failure::from(error))).boxed();
            }
        }
        self.next.call(ctx, op)
    }

    fn target_url(&self, request: &TaskRequest) -> Option<String> {
        self.next.target_url(request)
    }
}
