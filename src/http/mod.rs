//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (mutual TLS on the task listener)
//!     → server.rs (Axum routers, request id, body limit, request span)
//!     → transport.rs (decode into an Operation)
//!     → gateway Pipeline
//!     → transport.rs (encode the Outcome as JSON)
//!     → Send to client
//! ```

pub mod server;
pub mod transport;

pub use server::{monitoring_router, task_router, GatewayServer, ServerError};
pub use transport::AppState;
