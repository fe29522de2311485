//! Key-value store abstraction for pool membership.
//!
//! Membership is a set encoded as empty-valued keys:
//! `<prefix><pool>/<ip:port>`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::config::ConsulConfig;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("invalid store url: {0}")]
    Url(#[from] url::ParseError),

    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("store returned status {status} for {key}")]
    Status { status: StatusCode, key: String },

    #[error("store rejected write of {0}")]
    Rejected(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal keyed-store operations the synchronizer needs.
///
/// All operations must be idempotent: they are retried blindly.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Every key starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;

    /// Create `key` with an empty value.
    async fn put(&self, key: &str) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

#[async_trait]
impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        (**self).list_keys(prefix).await
    }

    async fn put(&self, key: &str) -> Result<(), KvError> {
        (**self).put(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        (**self).delete(key).await
    }
}

/// Directory holding the members of `pool`, always ending in `/`.
pub fn pool_dir(prefix: &str, pool: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        format!("{}{}/", prefix, pool)
    } else {
        format!("{}/{}/", prefix, pool)
    }
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    keys: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let store = Self::new();
        store.lock().extend(keys.into_iter().map(Into::into));
        store
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        // A panic while holding the lock cannot leave the set half-updated.
        self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        Ok(self
            .lock()
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn put(&self, key: &str) -> Result<(), KvError> {
        self.lock().insert(key.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Consul KV over its HTTP API.
#[derive(Debug, Clone)]
pub struct ConsulKv {
    client: reqwest::Client,
    base: Url,
}

impl ConsulKv {
    pub fn new(config: &ConsulConfig) -> Result<Self, KvError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base = Url::parse(&format!("http://{}/v1/kv/", config.address))?;
        Ok(Self { client, base })
    }

    fn key_url(&self, key: &str) -> Result<Url, KvError> {
        Ok(self.base.join(key.trim_start_matches('/'))?)
    }
}

#[async_trait]
impl KvStore for ConsulKv {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let mut url = self.key_url(prefix)?;
        url.set_query(Some("keys&consistent"));

        let response = self.client.get(url).send().await?;
        match response.status() {
            // Consul answers 404 when nothing lives under the prefix.
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => Ok(response.json::<Vec<String>>().await?),
            status => Err(KvError::Status {
                status,
                key: prefix.to_string(),
            }),
        }
    }

    async fn put(&self, key: &str) -> Result<(), KvError> {
        let response = self.client.put(self.key_url(key)?).body("").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KvError::Status {
                status,
                key: key.to_string(),
            });
        }
        if response.text().await?.trim() == "false" {
            return Err(KvError::Rejected(key.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let response = self.client.delete(self.key_url(key)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(KvError::Status {
                status,
                key: key.to_string(),
            });
        }
        Ok(())
    }
}
