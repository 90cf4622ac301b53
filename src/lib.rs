//! Mutual-TLS task gateway library.

pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod upstream;

pub use config::schema::GatewayConfig;
pub use gateway::Pipeline;
pub use http::GatewayServer;
pub use lifecycle::Termination;
