//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for webrouter.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration shared by both daemons.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WebrouterConfig {
    /// Registry feed settings.
    pub registry: RegistryConfig,

    /// Consul key-value store settings.
    pub consul: ConsulConfig,

    /// Local reverse proxy (nginx/openresty) settings.
    pub nginx: NginxConfig,

    /// Retry policy for key-value store operations.
    pub retry: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Registry (lainlet) streaming feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry address as `host:port`.
    pub address: String,

    /// Path of the watch endpoint.
    pub path: String,

    /// Delay before reconnecting after the stream ends or fails.
    pub reconnect_delay_ms: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl RegistryConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            address: "lainlet.lain:9001".to_string(),
            path: "/v2/webrouter/webprocs".to_string(),
            reconnect_delay_ms: 1000,
            connect_timeout_secs: 5,
        }
    }
}

/// Consul key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsulConfig {
    /// Consul HTTP API address as `host:port`.
    pub address: String,

    /// Key prefix under which pool membership is stored.
    pub prefix: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "consul.lain:8500".to_string(),
            prefix: "lain/webrouter/upstreams/".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Reverse proxy process and rendering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NginxConfig {
    /// Proxy prefix directory (contains `conf/`, `upstreams/`).
    pub path: PathBuf,

    /// Proxy executable used for the syntax check.
    pub binary: PathBuf,

    /// Pid file written by the running proxy.
    pub pid_path: PathBuf,

    /// Directory for proxy access and error logs.
    pub log_path: PathBuf,

    /// Directory holding PEM `*.crt` certificates.
    pub ssl_path: PathBuf,

    /// Default server name for the catch-all server block.
    pub server_name: String,

    /// Enable TLS listeners and certificate matching.
    pub https: bool,

    /// Tag locations that have a canary pool.
    pub ab_test: bool,

    pub server_names_hash_max_size: u32,
    pub server_names_hash_bucket_size: u32,

    /// Shared memory for upstream checks, in megabytes.
    pub check_shm_size: u32,

    /// Poll interval while waiting for the pid file at startup.
    pub pid_wait_interval_ms: u64,
}

impl NginxConfig {
    pub fn conf_dir(&self) -> PathBuf {
        self.path.join("conf")
    }

    pub fn main_conf_path(&self) -> PathBuf {
        self.conf_dir().join("nginx.conf")
    }

    pub fn server_conf_path(&self) -> PathBuf {
        self.conf_dir().join("server.conf")
    }

    pub fn upstream_conf_path(&self) -> PathBuf {
        self.conf_dir().join("upstream.conf")
    }
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/usr/local/openresty/nginx/"),
            binary: PathBuf::from("nginx"),
            pid_path: PathBuf::from("/var/run/nginx.pid"),
            log_path: PathBuf::from("/var/log/nginx/"),
            ssl_path: PathBuf::from("/etc/nginx/ssl/"),
            server_name: "localhost".to_string(),
            https: false,
            ab_test: false,
            server_names_hash_max_size: 512,
            server_names_hash_bucket_size: 64,
            check_shm_size: 1,
            pid_wait_interval_ms: 1000,
        }
    }
}

/// Retry configuration for store operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per operation (including the first).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Graphite health reporting.
    pub graphite: GraphiteConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            graphite: GraphiteConfig::default(),
        }
    }
}

/// Graphite health reporting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphiteConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,

    /// Reporting interval in seconds.
    pub interval_secs: u64,

    /// Cluster domain; dots become underscores in metric keys.
    pub domain: String,

    /// Instance number of this proxy, used in per-instance keys.
    pub instance: String,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 2003,
            interval_secs: 60,
            domain: String::new(),
            instance: String::new(),
        }
    }
}
