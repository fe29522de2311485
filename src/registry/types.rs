//! Registry wire types.
//!
//! A `data` payload is a JSON object keyed by service key. Each value is
//! either a flat record:
//!
//! ```text
//! {"Annotation": "{...}", "ContainerInfos": [{"ContainerIp": "10.0.0.1", "Expose": 8080}]}
//! ```
//!
//! or a pod-shaped record carrying one entry per running pod:
//!
//! ```text
//! {"PodInfos": [{"Annotation": "{...}", "ContainerInfos": [...]}, ...]}
//! ```

use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Registry identifier of a service: `namespace.app.process`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(String);

impl ServiceKey {
    /// Parse a key, requiring exactly three dot-separated segments.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.split('.').count() == 3 {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pool identifier: the key with dots replaced by underscores.
    pub fn pool_name(&self) -> String {
        self.0.replace('.', "_")
    }

    /// Process segment (the third one).
    pub fn process(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or_default()
    }

    /// Canary services only contribute a pool; their routes belong to the
    /// non-canary sibling.
    pub fn is_canary(&self) -> bool {
        self.process().ends_with("_canary")
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single container as reported by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContainerInfo {
    #[serde(rename = "ContainerIp", default)]
    pub ip: String,

    #[serde(rename = "Expose", default)]
    pub port: u16,
}

impl ContainerInfo {
    /// `ip:port` form, or `None` when the container has no address yet.
    pub fn address(&self) -> Option<String> {
        if self.ip.is_empty() {
            None
        } else {
            Some(format!("{}:{}", self.ip, self.port))
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PodInfo {
    #[serde(rename = "Annotation", default)]
    annotation: String,

    #[serde(rename = "ContainerInfos", default)]
    containers: Vec<ContainerInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawServiceRecord {
    Pods {
        #[serde(rename = "PodInfos")]
        pods: Vec<PodInfo>,
    },
    Flat(PodInfo),
}

/// Normalised per-service record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawServiceRecord")]
pub struct ServiceRecord {
    /// Raw annotation JSON (decoded later, failures tolerated).
    pub annotation: String,

    /// Candidate endpoints.
    pub containers: Vec<ContainerInfo>,

    /// Number of running instances the registry reported.
    pub instances: usize,
}

impl From<RawServiceRecord> for ServiceRecord {
    fn from(raw: RawServiceRecord) -> Self {
        match raw {
            RawServiceRecord::Pods { pods } => Self {
                annotation: pods.first().map(|p| p.annotation.clone()).unwrap_or_default(),
                // One endpoint per pod: its first container.
                containers: pods
                    .iter()
                    .filter_map(|p| p.containers.first().cloned())
                    .collect(),
                instances: pods.len(),
            },
            RawServiceRecord::Flat(pod) => Self {
                annotation: pod.annotation,
                containers: pod.containers,
                instances: 1,
            },
        }
    }
}

/// One decoded point-in-time view of all services, in feed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub services: Vec<(ServiceKey, ServiceRecord)>,
}

/// Reasons a `data` payload is rejected as a whole.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Snapshot {
    /// Decode a `data` payload.
    ///
    /// The payload must be a JSON object. Entries with an invalid key or a
    /// record that does not decode are skipped individually.
    pub fn decode(payload: &str) -> Result<Self, SnapshotError> {
        let entries: Map<String, Value> = serde_json::from_str(payload)?;
        let mut services = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            let Some(service_key) = ServiceKey::parse(&key) else {
                tracing::debug!(key = %key, "Skipping service with malformed key");
                continue;
            };
            match serde_json::from_value::<ServiceRecord>(value) {
                Ok(record) => services.push((service_key, record)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping malformed service record");
                }
            }
        }

        Ok(Self { services })
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_key() {
        let key = ServiceKey::parse("shop.web.web_canary").unwrap();
        assert_eq!(key.pool_name(), "shop_web_web_canary");
        assert_eq!(key.process(), "web_canary");
        assert!(key.is_canary());

        assert!(ServiceKey::parse("shop.web").is_none());
        assert!(ServiceKey::parse("a.b.c.d").is_none());
        assert!(!ServiceKey::parse("shop.web.web").unwrap().is_canary());
    }

    #[test]
    fn test_decode_flat_record() {
        let snapshot = Snapshot::decode(
            r#"{"shop.web.web": {"Annotation": "{}", "ContainerInfos": [{"ContainerIp": "10.0.0.1", "Expose": 8080}]}}"#,
        )
        .unwrap();

        assert_eq!(snapshot.len(), 1);
        let (key, record) = &snapshot.services[0];
        assert_eq!(key.as_str(), "shop.web.web");
        assert_eq!(record.instances, 1);
        assert_eq!(record.containers[0].address().as_deref(), Some("10.0.0.1:8080"));
    }

    #[test]
    fn test_decode_pod_record_uses_first_container() {
        let snapshot = Snapshot::decode(
            r#"{"shop.web.web": {"PodInfos": [
                {"Annotation": "{\"mountpoint\": [\"shop.io\"]}",
                 "ContainerInfos": [{"ContainerIp": "10.0.0.1", "Expose": 80}, {"ContainerIp": "10.0.0.9", "Expose": 80}]},
                {"Annotation": "ignored",
                 "ContainerInfos": [{"ContainerIp": "10.0.0.2", "Expose": 80}]}
            ]}}"#,
        )
        .unwrap();

        let record = &snapshot.services[0].1;
        assert_eq!(record.instances, 2);
        assert_eq!(record.annotation, r#"{"mountpoint": ["shop.io"]}"#);
        let addrs: Vec<_> = record.containers.iter().filter_map(|c| c.address()).collect();
        assert_eq!(addrs, vec!["10.0.0.1:80", "10.0.0.2:80"]);
    }

    #[test]
    fn test_empty_pods_means_no_instances() {
        let snapshot = Snapshot::decode(r#"{"shop.web.web": {"PodInfos": []}}"#).unwrap();
        assert_eq!(snapshot.services[0].1.instances, 0);
    }

    #[test]
    fn test_skips_bad_entries_keeps_order() {
        let snapshot = Snapshot::decode(
            r#"{
                "z.z.z": {"ContainerInfos": []},
                "bad": {"ContainerInfos": []},
                "a.a.a": {"ContainerInfos": "not a list"},
                "m.m.m": {"ContainerInfos": []}
            }"#,
        )
        .unwrap();

        let keys: Vec<_> = snapshot.services.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z.z.z", "m.m.m"]);
    }

    #[test]
    fn test_non_object_payload_is_error() {
        assert!(Snapshot::decode("[1, 2]").is_err());
        assert!(Snapshot::decode("{truncated").is_err());
    }
}
