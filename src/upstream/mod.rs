//! Upstream membership synchronization (the `webrouter-confd` daemon).
//!
//! # Data Flow
//! ```text
//! Snapshot
//!     → routing::pools_from_snapshot (pool → endpoints)
//!     → reconciler.rs (list stored keys, diff, put/delete with bounded retry)
//!     → store.rs KvStore (Consul, or in-memory)
//! ```

pub mod reconciler;
pub mod service;
pub mod store;

pub use reconciler::{diff, PoolDiff, ReconcileReport, UpstreamReconciler};
pub use store::{pool_dir, ConsulKv, KvError, KvStore, MemoryKv};
