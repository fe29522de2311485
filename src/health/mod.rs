//! Health subsystem.
//!
//! # Data Flow
//! ```text
//! Snapshot consumer (single writer)
//!     → state.rs HealthFlag (atomic)
//!     → reporter.rs (periodic timer)
//!         → graphite.rs (plaintext protocol)
//!         → observability::metrics (gauge)
//! ```

pub mod graphite;
pub mod reporter;
pub mod state;

pub use graphite::Component;
pub use reporter::HealthReporter;
pub use state::{HealthFlag, HealthState};
