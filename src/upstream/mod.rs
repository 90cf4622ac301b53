//! Upstream connectivity subsystem.
//!
//! # Data Flow
//! ```text
//! ForwardingService
//!     → client.rs (shared reqwest client: timeout, idle pool, trust roots)
//!     → limiter.rs (per-host connection slots, bounded by the timeout)
//!     → upstream service
//! ```
//!
//! # Design Decisions
//! - Single attempt per call; nothing here retries
//! - The pool is the only state shared between concurrent calls

pub mod client;
pub mod limiter;

pub use client::{ReserveError, UpstreamClient};
pub use limiter::{HostLimiter, HostPermit};
