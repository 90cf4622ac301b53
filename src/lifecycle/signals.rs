//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM or SIGINT and name the one that arrived
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - If the Unix handlers cannot be installed, fall back to Ctrl-C only;
//!   if that fails too, never resolve and leave termination to the
//!   listeners

/// Resolve with the name of the first termination signal received.
pub async fn wait_for_termination() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut terminate), Ok(mut interrupt)) => {
                return tokio::select! {
                    _ = terminate.recv() => "SIGTERM",
                    _ = interrupt.recv() => "SIGINT",
                };
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install signal handlers, using Ctrl-C only");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending().await
        }
    }
}
