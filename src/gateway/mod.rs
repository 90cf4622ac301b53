//! Task forwarding core.
//!
//! # Data Flow
//! ```text
//! http/transport.rs decodes an Operation
//!     → pipeline.rs: Validate → Observe → ForwardingService
//!         → forward.rs: health check, then POST /task
//!         → classify.rs on any transport failure
//!     ← Outcome (Reply or Failure)
//! http/transport.rs encodes the envelope
//! ```
//!
//! # Design Decisions
//! - Every call is independent; no state survives a call
//! - Errors are classified once, at the network boundary, and only
//!   reshaped afterwards
//! - Internal detail reaches the log, never the caller

pub mod classify;
pub mod error;
pub mod forward;
pub mod model;
pub mod observe;
pub mod pipeline;
pub mod validation;

pub use classify::{classify, ClassifiedError};
pub use error::{Failure, GatewayError};
pub use forward::ForwardingService;
pub use model::{HealthStatus, TaskRequest, TaskResponse, VersionInfo};
pub use pipeline::{CallContext, Handler, Operation, Outcome, Pipeline, Reply};
