//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use webrouter::config::RegistryConfig;
use webrouter::upstream::{KvError, KvStore, MemoryKv};

/// What the mock registry does with one accepted connection.
pub struct Script {
    pub lines: Vec<String>,
    /// Keep the connection open after the last line instead of closing it.
    pub hold_open: bool,
}

impl Script {
    pub fn closing(lines: Vec<String>) -> Self {
        Self { lines, hold_open: false }
    }

    pub fn holding(lines: Vec<String>) -> Self {
        Self { lines, hold_open: true }
    }
}

/// Start a registry watch endpoint that plays one script per connection.
///
/// Connections beyond the last script are held open without data.
pub async fn start_registry(scripts: Vec<Script>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut scripts = scripts.into_iter();
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let script = scripts.next().unwrap_or_else(|| Script::holding(Vec::new()));

            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for line in script.lines {
                    if socket.write_all(line.as_bytes()).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                }
                if script.hold_open {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// Registry config pointing at a mock endpoint with a fast reconnect.
pub fn registry_config(addr: SocketAddr) -> RegistryConfig {
    RegistryConfig {
        address: addr.to_string(),
        reconnect_delay_ms: 20,
        connect_timeout_secs: 1,
        ..RegistryConfig::default()
    }
}

/// A `data:` event line carrying `payload`.
pub fn data_line(payload: &serde_json::Value) -> String {
    format!("event: update\ndata: {}\n\n", payload)
}

/// One pod-shaped service record.
pub fn service(mountpoints: &[&str], endpoints: &[(&str, u16)]) -> serde_json::Value {
    let annotation = json!({ "mountpoint": mountpoints }).to_string();
    let pods: Vec<_> = endpoints
        .iter()
        .map(|(ip, port)| {
            json!({
                "Annotation": annotation,
                "ContainerInfos": [{ "ContainerIp": ip, "Expose": port }],
            })
        })
        .collect();
    json!({ "PodInfos": pods })
}

/// A store that fails the first `failures` calls, then delegates.
#[derive(Clone)]
pub struct FlakyKv {
    inner: MemoryKv,
    remaining: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
}

impl FlakyKv {
    pub fn new(inner: MemoryKv, failures: usize) -> Self {
        Self {
            inner,
            remaining: Arc::new(AtomicUsize::new(failures)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fail_now(&self) -> Result<(), KvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(KvError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FlakyKv {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        self.fail_now()?;
        self.inner.list_keys(prefix).await
    }

    async fn put(&self, key: &str) -> Result<(), KvError> {
        self.fail_now()?;
        self.inner.put(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.fail_now()?;
        self.inner.delete(key).await
    }
}
