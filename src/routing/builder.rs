//! Snapshot → routing table construction.
//!
//! # Algorithm
//! ```text
//! for each service (feed order) with ≥1 instance:
//!     build Pool (valid endpoints, sentinel when empty)
//!     unless canary: bind every mount point (host, path) → pool
//!         already bound to another pool → DISCARDED (invalid table)
//! derive AB-test flags from `<pool>_canary`
//! attach certificates by hostname verification
//! ```
//!
//! The builder never publishes a partial table: a conflict returns
//! [`RoutingTable::invalid`] and the caller keeps serving its previous table.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::registry::types::{ServiceKey, ServiceRecord, Snapshot};
use crate::routing::annotation::Annotation;
use crate::routing::certs::CertificateStore;
use crate::routing::table::{Location, Pool, RoutingConflict, RoutingTable, Server};

/// Suffix that marks a pool as the canary sibling of another.
pub const CANARY_SUFFIX: &str = "_canary";

/// Builds routing tables from snapshots.
///
/// Holds only immutable startup state, so one builder serves every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingTableBuilder<'a> {
    certificates: Option<&'a CertificateStore>,
}

impl<'a> RoutingTableBuilder<'a> {
    pub fn new() -> Self {
        Self { certificates: None }
    }

    /// Enable certificate matching against `store`.
    pub fn with_certificates(mut self, store: &'a CertificateStore) -> Self {
        self.certificates = Some(store);
        self
    }

    /// Fold a snapshot into a routing table.
    pub fn build(&self, snapshot: &Snapshot) -> RoutingTable {
        let mut servers: BTreeMap<String, Server> = BTreeMap::new();
        let mut pools = BTreeMap::new();

        for (key, record) in routable(snapshot) {
            let pool_name = key.pool_name();
            let annotation = Annotation::decode(&record.annotation);

            if !key.is_canary() {
                for mount in annotation.mounts() {
                    let server = servers
                        .entry(mount.host.clone())
                        .or_insert_with(|| Server::new(mount.host.clone()));

                    if let Some(existing) = server.locations.get(&mount.path) {
                        if existing.pool != pool_name {
                            let conflict = RoutingConflict {
                                hostname: mount.host,
                                path: mount.path,
                                existing_pool: existing.pool.clone(),
                                conflicting_pool: pool_name,
                            };
                            tracing::error!(%conflict, "Routing conflict, discarding snapshot");
                            return RoutingTable::invalid(conflict);
                        }
                        continue;
                    }

                    server.locations.insert(
                        mount.path,
                        Location {
                            pool: pool_name.clone(),
                            https_only: annotation.https_only,
                            ab_test: false,
                        },
                    );
                }
            }

            let pool = build_pool(&pool_name, &annotation, record);
            pools.insert(pool_name, pool);
        }

        for server in servers.values_mut() {
            for location in server.locations.values_mut() {
                location.ab_test = pools.contains_key(&canary_of(&location.pool));
            }
        }

        if let Some(store) = self.certificates {
            for server in servers.values_mut() {
                server.certificate = store.find_for_host(&server.hostname).map(str::to_string);
                if server.certificate.is_none() {
                    tracing::debug!(hostname = %server.hostname, "No certificate matches server");
                }
            }
        }

        RoutingTable {
            servers,
            pools,
            conflict: None,
        }
    }
}

/// Pool membership for a snapshot, independent of mount points.
///
/// Mount-point conflicts do not affect membership, so the upstream
/// synchronizer uses this directly.
pub fn pools_from_snapshot(snapshot: &Snapshot) -> BTreeMap<String, Pool> {
    routable(snapshot)
        .map(|(key, record)| {
            let pool_name = key.pool_name();
            let annotation = Annotation::decode(&record.annotation);
            let pool = build_pool(&pool_name, &annotation, record);
            (pool_name, pool)
        })
        .collect()
}

/// Name of the canary sibling of `pool`.
pub fn canary_of(pool: &str) -> String {
    format!("{}{}", pool, CANARY_SUFFIX)
}

fn routable(snapshot: &Snapshot) -> impl Iterator<Item = (&ServiceKey, &ServiceRecord)> {
    snapshot
        .services
        .iter()
        .filter(|(_, record)| record.instances > 0)
        .map(|(key, record)| (key, record))
}

fn build_pool(name: &str, annotation: &Annotation, record: &ServiceRecord) -> Pool {
    let endpoints = record
        .containers
        .iter()
        .filter_map(|container| container.address())
        .filter_map(|addr| match addr.parse::<SocketAddr>() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                tracing::warn!(pool = %name, addr = %addr, error = %e, "Dropping invalid endpoint");
                None
            }
        })
        .collect();

    Pool::new(name, annotation.health_check.clone(), endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::ContainerInfo;
    use crate::routing::table::SENTINEL_ENDPOINT;

    fn service(key: &str, annotation: &str, containers: &[(&str, u16)]) -> (ServiceKey, ServiceRecord) {
        (
            ServiceKey::parse(key).unwrap(),
            ServiceRecord {
                annotation: annotation.to_string(),
                containers: containers
                    .iter()
                    .map(|(ip, port)| ContainerInfo {
                        ip: ip.to_string(),
                        port: *port,
                    })
                    .collect(),
                instances: 1,
            },
        )
    }

    fn snapshot(services: Vec<(ServiceKey, ServiceRecord)>) -> Snapshot {
        Snapshot { services }
    }

    #[test]
    fn test_single_service_scenario() {
        let snap = snapshot(vec![service(
            "shop.svc.web",
            r#"{"mountpoint": ["shop.io/cart"]}"#,
            &[("10.0.0.1", 8080)],
        )]);

        let table = RoutingTableBuilder::new().build(&snap);
        assert!(table.is_valid());

        let location = table.location("shop.io", "cart").unwrap();
        assert_eq!(location.pool, "shop_svc_web");
        assert!(!location.https_only);
        assert!(!location.ab_test);

        let pool = &table.pools["shop_svc_web"];
        assert_eq!(pool.endpoints, vec!["10.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_conflict_invalidates_table() {
        let snap = snapshot(vec![
            service("a.app.web", r#"{"mountpoint": ["example.com/api"]}"#, &[("10.0.0.1", 80)]),
            service("b.app.web", r#"{"mountpoint": ["example.com/api/"]}"#, &[("10.0.0.2", 80)]),
        ]);

        let table = RoutingTableBuilder::new().build(&snap);
        assert!(!table.is_valid());
        assert!(table.servers.is_empty());
        assert!(table.pools.is_empty());

        let conflict = table.conflict.unwrap();
        assert_eq!(conflict.hostname, "example.com");
        assert_eq!(conflict.path, "api");
        assert_eq!(conflict.existing_pool, "a_app_web");
        assert_eq!(conflict.conflicting_pool, "b_app_web");
    }

    #[test]
    fn test_same_pool_may_bind_twice() {
        let snap = snapshot(vec![service(
            "a.app.web",
            r#"{"mountpoint": ["example.com/api", "example.com/api/"]}"#,
            &[("10.0.0.1", 80)],
        )]);
        assert!(RoutingTableBuilder::new().build(&snap).is_valid());
    }

    #[test]
    fn test_empty_pool_fallback() {
        let snap = snapshot(vec![service("a.app.web", r#"{"mountpoint": ["a.io"]}"#, &[])]);
        let table = RoutingTableBuilder::new().build(&snap);
        assert_eq!(table.pools["a_app_web"].endpoints, vec![SENTINEL_ENDPOINT]);
        assert_eq!(table.location("a.io", "/").unwrap().pool, "a_app_web");
    }

    #[test]
    fn test_invalid_endpoints_dropped() {
        let snap = snapshot(vec![service(
            "a.app.web",
            "{}",
            &[("10.0.0.1", 80), ("not-an-ip", 80), ("", 80)],
        )]);
        let table = RoutingTableBuilder::new().build(&snap);
        assert_eq!(table.pools["a_app_web"].endpoints.len(), 1);
    }

    #[test]
    fn test_ab_test_derivation() {
        let snap = snapshot(vec![
            service("shop.checkout.web", r#"{"mountpoint": ["shop.io/checkout", "pay.shop.io"]}"#, &[("10.0.0.1", 80)]),
            service("shop.checkout.web_canary", r#"{"mountpoint": ["shop.io/checkout"]}"#, &[("10.0.0.2", 80)]),
            service("shop.cart.web", r#"{"mountpoint": ["shop.io/cart"]}"#, &[("10.0.0.3", 80)]),
        ]);

        let table = RoutingTableBuilder::new().build(&snap);
        assert!(table.is_valid(), "canary mount points must not conflict");
        assert!(table.pools.contains_key("shop_checkout_web_canary"));
        assert!(table.location("shop.io", "checkout").unwrap().ab_test);
        assert!(table.location("pay.shop.io", "/").unwrap().ab_test);
        assert!(!table.location("shop.io", "cart").unwrap().ab_test);
    }

    #[test]
    fn test_ab_test_false_without_canary() {
        let snap = snapshot(vec![service(
            "shop.checkout.web",
            r#"{"mountpoint": ["shop.io/checkout"]}"#,
            &[("10.0.0.1", 80)],
        )]);
        let table = RoutingTableBuilder::new().build(&snap);
        assert!(!table.location("shop.io", "checkout").unwrap().ab_test);
    }

    #[test]
    fn test_services_without_instances_skipped() {
        let (key, mut record) = service("a.app.web", r#"{"mountpoint": ["a.io"]}"#, &[]);
        record.instances = 0;
        let table = RoutingTableBuilder::new().build(&snapshot(vec![(key, record)]));
        assert!(table.servers.is_empty());
        assert!(table.pools.is_empty());
    }

    #[test]
    fn test_broken_annotation_not_routed_but_pooled() {
        let snap = snapshot(vec![service("a.app.web", "{broken", &[("10.0.0.1", 80)])]);
        let table = RoutingTableBuilder::new().build(&snap);
        assert!(table.is_valid());
        assert!(table.servers.is_empty());
        assert!(table.pools.contains_key("a_app_web"));
    }

    #[test]
    fn test_https_and_healthcheck_propagate() {
        let snap = snapshot(vec![service(
            "a.app.web",
            r#"{"mountpoint": ["a.io/x"], "https_only": true, "healthcheck": "/health"}"#,
            &[("10.0.0.1", 80)],
        )]);
        let table = RoutingTableBuilder::new().build(&snap);
        assert!(table.location("a.io", "x").unwrap().https_only);
        assert_eq!(table.pools["a_app_web"].health_check.as_deref(), Some("/health"));
    }

    #[test]
    fn test_pools_from_snapshot_ignores_conflicts() {
        let snap = snapshot(vec![
            service("a.app.web", r#"{"mountpoint": ["x.io"]}"#, &[("10.0.0.1", 80)]),
            service("b.app.web", r#"{"mountpoint": ["x.io"]}"#, &[("10.0.0.2", 80)]),
        ]);
        let pools = pools_from_snapshot(&snap);
        assert_eq!(pools.len(), 2);
        assert!(!RoutingTableBuilder::new().build(&snap).is_valid());
    }

    #[test]
    fn test_certificate_matching() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ssl");
        let store = CertificateStore::load(&dir).unwrap();
        let snap = snapshot(vec![service(
            "a.app.web",
            r#"{"mountpoint": ["shop.io/cart", "api.example.com", "plain.io"]}"#,
            &[("10.0.0.1", 80)],
        )]);

        let table = RoutingTableBuilder::new().with_certificates(&store).build(&snap);
        assert_eq!(table.servers["shop.io"].certificate.as_deref(), Some("shop"));
        assert_eq!(table.servers["api.example.com"].certificate.as_deref(), Some("wildcard"));
        assert_eq!(table.servers["plain.io"].certificate, None);

        let without = RoutingTableBuilder::new().build(&snap);
        assert_eq!(without.servers["shop.io"].certificate, None);
    }
}
