//! Routing table model.
//!
//! A table is rebuilt in full from every snapshot and never mutated
//! afterwards. Ordered maps keep rendering and equality deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use serde::Serialize;

/// Placeholder backend for pools without live instances.
///
/// Keeps generated upstream blocks syntactically valid while the pool is down.
pub const SENTINEL_ENDPOINT: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 11111));

/// Path binding inside a virtual host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub pool: String,
    pub https_only: bool,
    /// A `<pool>_canary` pool exists in the same table.
    pub ab_test: bool,
}

/// A virtual host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Server {
    pub hostname: String,
    /// Identifier of the certificate that verifies this hostname.
    pub certificate: Option<String>,
    pub locations: BTreeMap<String, Location>,
}

impl Server {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }
}

/// A named backend group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pool {
    pub name: String,
    pub health_check: Option<String>,
    /// Never empty; see [`SENTINEL_ENDPOINT`].
    pub endpoints: Vec<SocketAddr>,
}

impl Pool {
    /// Build a pool, substituting the sentinel when `endpoints` is empty.
    pub fn new(name: impl Into<String>, health_check: Option<String>, endpoints: Vec<SocketAddr>) -> Self {
        let name = name.into();
        let endpoints = if endpoints.is_empty() {
            tracing::error!(pool = %name, "No servers inside upstream, using sentinel endpoint");
            vec![SENTINEL_ENDPOINT]
        } else {
            endpoints
        };
        Self {
            name,
            health_check,
            endpoints,
        }
    }

    /// True when the pool only holds the sentinel.
    pub fn is_down(&self) -> bool {
        self.endpoints == [SENTINEL_ENDPOINT]
    }
}

/// Two pools claimed the same host and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConflict {
    pub hostname: String,
    pub path: String,
    pub existing_pool: String,
    pub conflicting_pool: String,
}

impl fmt::Display for RoutingConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "servername: {} location: {} upstream1: {} upstream2: {} duplicate location",
            self.hostname, self.path, self.existing_pool, self.conflicting_pool
        )
    }
}

impl std::error::Error for RoutingConflict {}

/// The full routing state derived from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    pub servers: BTreeMap<String, Server>,
    pub pools: BTreeMap<String, Pool>,
    /// Set when the snapshot was rejected; the maps are empty then.
    pub conflict: Option<RoutingConflict>,
}

impl RoutingTable {
    /// A rejected table carrying only the reason.
    pub fn invalid(conflict: RoutingConflict) -> Self {
        Self {
            servers: BTreeMap::new(),
            pools: BTreeMap::new(),
            conflict: Some(conflict),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.conflict.is_none()
    }

    pub fn location(&self, hostname: &str, path: &str) -> Option<&Location> {
        self.servers.get(hostname)?.locations.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_gets_sentinel() {
        let pool = Pool::new("svc", None, Vec::new());
        assert_eq!(pool.endpoints, vec![SENTINEL_ENDPOINT]);
        assert_eq!(pool.endpoints[0].to_string(), "127.0.0.1:11111");
        assert!(pool.is_down());
    }

    #[test]
    fn test_invalid_table() {
        let table = RoutingTable::invalid(RoutingConflict {
            hostname: "example.com".into(),
            path: "api".into(),
            existing_pool: "a".into(),
            conflicting_pool: "b".into(),
        });
        assert!(!table.is_valid());
        assert!(table.servers.is_empty());
        assert!(table.conflict.unwrap().to_string().contains("duplicate location"));
    }
}
