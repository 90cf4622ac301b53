//! Handler chaining.
//!
//! # Data Flow
//! ```text
//! Operation (decoded by the transport adapter)
//!     → validation.rs   (task requests only; rejects before any I/O)
//!     → observe.rs      (timed logging, panic boundary)
//!     → forward.rs      (health check + forward, or local health/version)
//!     ← Outcome (Reply or Failure), unchanged on the way back
//! ```
//!
//! Every stage implements [`Handler`] and wraps the next one, so the chain
//! is assembled by plain construction in [`Pipeline::new`].

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;

use crate::gateway::error::Failure;
use crate::gateway::model::{HealthStatus, TaskRequest, TaskResponse, VersionInfo};
use crate::gateway::observe::Observe;
use crate::gateway::validation::Validate;

/// One decoded inbound call.
#[derive(Debug, Clone)]
pub enum Operation {
    Task(TaskRequest),
    Health,
    Version,
}

impl Operation {
    /// Path of the endpoint that produced this operation.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Operation::Task(_) => "/task",
            Operation::Health => "/health",
            Operation::Version => "/version",
        }
    }
}

/// Successful result of an [`Operation`], variant for variant.
#[derive(Debug, Clone)]
pub enum Reply {
    Task(TaskResponse),
    Health(HealthStatus),
    Version(VersionInfo),
}

pub type Outcome = Result<Reply, Failure>;

/// Per-call context handed down the chain.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// When the transport adapter accepted the call.
    pub received_at: Instant,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            received_at: Instant::now(),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A stage of the request pipeline.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: CallContext, op: Operation) -> BoxFuture<'_, Outcome>;

    /// The upstream URL a task request will be sent to, if this stage (or
    /// one below it) forwards tasks.
    fn target_url(&self, _request: &TaskRequest) -> Option<String> {
        None
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call(&self, ctx: CallContext, op: Operation) -> BoxFuture<'_, Outcome> {
        (**self).call(ctx, op)
    }

    fn target_url(&self, request: &TaskRequest) -> Option<String> {
        (**self).target_url(request)
    }
}

/// The assembled chain, cheap to clone into every request handler.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<dyn Handler>,
}

impl Pipeline {
    /// Wrap `service` in the observability stage, then the validation stage.
    pub fn new<H: Handler>(service: H) -> Self {
        Self {
            inner: Arc::new(Validate::new(Observe::new(service))),
        }
    }

    pub async fn dispatch(&self, op: Operation) -> Outcome {
        self.inner.call(CallContext::new(), op).await
    }
}
