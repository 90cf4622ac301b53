//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Resolve config → Init logging → Load TLS material → Build pipeline
//!     → Start both listeners
//!
//! Termination:
//!     First of { task listener ends, monitoring listener ends,
//!                SIGTERM/SIGINT (signals.rs) } → log → exit
//! ```
//!
//! # Design Decisions
//! - No drain phase: whichever event comes first ends the process
//! - A signal exits cleanly, a listener failure exits with status 1

use std::fmt;
use std::io;

pub mod signals;

/// Why the gateway stopped serving.
#[derive(Debug)]
pub enum Termination {
    /// A listener stopped, with its result.
    Listener {
        name: &'static str,
        result: io::Result<()>,
    },
    /// A termination signal arrived.
    Signal(&'static str),
}

impl Termination {
    /// Process exit status for this termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Signal(_) => 0,
            Termination::Listener { .. } => 1,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Listener {
                name,
                result: Err(e),
            } => write!(f, "{name} listener failed: {e}"),
            Termination::Listener { name, result: Ok(()) } => {
                write!(f, "{name} listener stopped")
            }
            Termination::Signal(signal) => write!(f, "received {signal}"),
        }
    }
}
