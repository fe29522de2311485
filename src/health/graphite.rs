//! Graphite plaintext protocol sender.
//!
//! One connection per send: `<key> <value> <unix-ts>\n`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::health::state::HealthState;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Which daemon is reporting; selects the metric key layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// Upstream synchronizer (one per cluster).
    Confd,
    /// Proxy controller (one per proxy instance).
    OpenResty { instance: String },
}

impl Component {
    pub fn label(&self) -> &'static str {
        match self {
            Component::Confd => "confd",
            Component::OpenResty { .. } => "openresty",
        }
    }

    /// Health before the first snapshot is handled.
    ///
    /// The synchronizer has nothing to repair until a snapshot arrives, so it
    /// starts healthy. The proxy controller starts down until its first reload.
    pub fn initial_state(&self) -> HealthState {
        match self {
            Component::Confd => HealthState::Up,
            Component::OpenResty { .. } => HealthState::Down,
        }
    }

    /// Health metric key, e.g. `lain_local.webrouter.openresty.1.health`.
    pub fn health_key(&self, domain: &str) -> String {
        let domain = domain.replace('.', "_");
        match self {
            Component::Confd => format!("{}.webrouter.confd.health", domain),
            Component::OpenResty { instance } => {
                format!("{}.webrouter.openresty.{}.health", domain, instance)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphiteClient {
    host: String,
    port: u16,
}

impl GraphiteClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub async fn send(&self, key: &str, value: impl std::fmt::Display) -> std::io::Result<()> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let line = format!("{} {} {}\n", key, value, ts);

        let write = async {
            let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
            stream.write_all(line.as_bytes()).await?;
            stream.shutdown().await
        };

        timeout(SEND_TIMEOUT, write).await.map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::TimedOut, "graphite send timed out")
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_health_keys() {
        assert_eq!(
            Component::Confd.health_key("lain.local"),
            "lain_local.webrouter.confd.health"
        );
        let openresty = Component::OpenResty { instance: "2".into() };
        assert_eq!(
            openresty.health_key("lain.local"),
            "lain_local.webrouter.openresty.2.health"
        );
        assert_eq!(openresty.label(), "openresty");
    }

    #[test]
    fn test_initial_states() {
        assert_eq!(Component::Confd.initial_state(), HealthState::Up);
        let openresty = Component::OpenResty { instance: "1".into() };
        assert_eq!(openresty.initial_state(), HealthState::Down);
    }

    #[tokio::test]
    async fn test_send_plaintext_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = String::new();
            socket.read_to_string(&mut buf).await.unwrap();
            buf
        });

        GraphiteClient::new("127.0.0.1", port).send("a.b.health", 1).await.unwrap();

        let line = server.await.unwrap();
        let parts: Vec<_> = line.trim_end().split(' ').collect();
        assert_eq!(parts[0], "a.b.health");
        assert_eq!(parts[1], "1");
        assert!(parts[2].parse::<u64>().is_ok());
        assert!(line.ends_with('\n'));
    }
}
