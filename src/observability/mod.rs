//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout log collection
//!     → Prometheus scrape (optional)
//!     → graphite via health::reporter
//! ```

pub mod logging;
pub mod metrics;
