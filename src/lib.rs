//! Configuration daemons for a registry-driven nginx edge router.
//!
//! Two binaries share this library:
//! - `webrouter` renders server and upstream configuration for the local
//!   proxy and reloads it when virtual hosts change
//! - `webrouter-confd` keeps per-pool membership in Consul in sync with the
//!   registry so the proxy can update upstreams without reloading

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod nginx;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod routing;
pub mod upstream;

pub use config::WebrouterConfig;
pub use lifecycle::Shutdown;
pub use registry::Snapshot;
pub use routing::RoutingTable;
