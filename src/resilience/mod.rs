//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store operation:
//!     → retries.rs (bounded attempts, cancellable)
//!     → backoff.rs (capped exponential delay + jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Every retry loop has an attempt cap; exhaustion is reported, not hidden
//! - Retries only wrap idempotent operations

pub mod backoff;
pub mod retries;

pub use backoff::{calculate_backoff, RetryPolicy};
pub use retries::{retry_with_backoff, RetryError};
