//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve config → init logging/metrics → prepare proxy tree → wait for pid file
//!
//! Shutdown (shutdown.rs):
//!     Signal received → listeners resolve → tasks leave their loops → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownListener};
