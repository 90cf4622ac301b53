//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request span (http/server.rs: service, method, path)
//!     → per-call event (gateway/observe.rs: endpoint, ids, status, took)
//!     → logging.rs subscriber (JSON or pretty, filtered by level)
//!     → stdout
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through the span, the log event and the upstream call

pub mod logging;

pub use logging::init_logging;
