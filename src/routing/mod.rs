//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Snapshot (services in feed order)
//!     → annotation.rs (mount points, TLS flag, health check)
//!     → builder.rs (bind host/path → pool, detect conflicts, canary flags)
//!     → certs.rs (attach certificate ids by hostname verification)
//!     → table.rs RoutingTable (immutable, replaced wholesale)
//! ```
//!
//! # Design Decisions
//! - Tables are rebuilt from scratch per snapshot, never patched
//! - A conflict rejects the whole snapshot; no partial table escapes
//! - Deterministic: same snapshot and certificates always give the same table

pub mod annotation;
pub mod builder;
pub mod certs;
pub mod table;

pub use annotation::{Annotation, MountPoint};
pub use builder::{pools_from_snapshot, RoutingTableBuilder};
pub use certs::{CertificateError, CertificateStore};
pub use table::{Location, Pool, RoutingConflict, RoutingTable, Server, SENTINEL_ENDPOINT};
