//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! PEM files on disk
//!     → tls.rs (CA directory walk, cert/key loading)
//!     → rustls ServerConfig (mutual TLS or server-only)
//!     → axum-server listener (http/server.rs)
//! ```
//!
//! # Design Decisions
//! - One CA pool serves both client-certificate verification and the
//!   upstream client's extra trust roots
//! - Material is loaded once at startup; a bad file is a startup error

pub mod tls;

pub use tls::{TlsError, TlsMaterial};
