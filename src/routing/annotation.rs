//! Service annotation decoding.
//!
//! # Responsibilities
//! - Decode the opaque per-service annotation blob into routing directives
//! - Split mount points into (virtual host, path)
//!
//! # Design Decisions
//! - A broken annotation means "not routed", never an error
//! - A mistyped field falls back to its default; the other fields survive
//! - Mount point paths carry no leading slash; the host root is `/`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Routing directives attached to a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Annotation {
    #[serde(rename = "mountpoint", deserialize_with = "lenient")]
    pub mount_points: Vec<String>,

    #[serde(rename = "https_only", deserialize_with = "lenient")]
    pub https_only: bool,

    #[serde(rename = "healthcheck", deserialize_with = "lenient")]
    pub health_check: Option<String>,
}

/// Decode one field, using its default when the JSON type does not fit.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl Annotation {
    /// Decode an annotation.
    ///
    /// Broken JSON or a non-object yields the zero value.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<Annotation>(raw) {
            Ok(mut annotation) => {
                if annotation.health_check.as_deref().is_some_and(str::is_empty) {
                    annotation.health_check = None;
                }
                annotation
            }
            Err(e) => {
                if !raw.trim().is_empty() {
                    tracing::debug!(error = %e, "Ignoring malformed annotation");
                }
                Self::default()
            }
        }
    }

    /// Parsed mount points, skipping empty entries.
    pub fn mounts(&self) -> impl Iterator<Item = MountPoint> + '_ {
        self.mount_points.iter().filter_map(|raw| MountPoint::parse(raw))
    }
}

/// A virtual host plus path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub host: String,
    pub path: String,
}

impl MountPoint {
    /// Parse `host/path`, `host/path/` or `host`.
    ///
    /// One trailing `/` is stripped. The host ends at the first `/` found
    /// after the first character; without one the path is `/`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.strip_suffix('/').unwrap_or(raw);
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.find('/') {
            Some(idx) if idx > 0 => Some(Self {
                host: trimmed[..idx].to_string(),
                path: trimmed[idx + 1..].to_string(),
            }),
            _ => Some(Self {
                host: trimmed.to_string(),
                path: "/".to_string(),
            }),
        }
    }
}
