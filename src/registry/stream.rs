//! Long-lived registry watch stream.
//!
//! # States
//! ```text
//! CONNECTING → STREAMING → (read error / EOF) → RECONNECTING → CONNECTING
//! ```
//!
//! Every reconnect is a full resync: the registry sends the complete service
//! set on each new watch, so no resume cursor is kept.
//!
//! # Wire format
//! The response body is an unbounded sequence of `\n`-terminated `key: value`
//! lines. Only `data` lines carry a snapshot; every other line is ignored.

use std::time::Duration;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use url::Url;

use crate::config::RegistryConfig;
use crate::lifecycle::ShutdownListener;
use crate::registry::types::Snapshot;

/// Lines longer than this are treated as a broken stream.
const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Errors surfaced to the snapshot consumer.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid registry url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build registry client: {0}")]
    Client(reqwest::Error),

    #[error("failed to connect to registry: {0}")]
    Connect(reqwest::Error),

    #[error("registry returned status {0}")]
    Status(StatusCode),

    #[error("registry stream read failed: {0}")]
    Read(reqwest::Error),

    #[error("registry line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("registry stream ended")]
    Ended,

    #[error("snapshot consumer went away")]
    ConsumerGone,
}

/// What the reader hands to its consumer.
pub type StreamEvent = Result<Snapshot, StreamError>;

/// Reader for the registry watch endpoint.
#[derive(Debug, Clone)]
pub struct RegistryStream {
    client: reqwest::Client,
    url: Url,
    reconnect_delay: Duration,
}

impl RegistryStream {
    /// Create a reader for the configured registry.
    pub fn new(config: &RegistryConfig) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(StreamError::Client)?;

        Ok(Self {
            client,
            url: watch_url(&config.address, &config.path)?,
            reconnect_delay: config.reconnect_delay(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Start the reader on its own task.
    ///
    /// The channel has a single slot, so the reader cannot run ahead of the
    /// consumer by more than one snapshot and never drops one.
    pub fn spawn(self, shutdown: ShutdownListener) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.run(tx, shutdown));
        rx
    }

    /// Run until shutdown or until the consumer drops its receiver.
    pub async fn run(self, tx: mpsc::Sender<StreamEvent>, mut shutdown: ShutdownListener) {
        tracing::info!(url = %self.url, "Registry watcher starting");

        loop {
            let outcome = tokio::select! {
                outcome = self.stream_once(&tx) => outcome,
                _ = shutdown.recv() => break,
            };

            let err = match outcome {
                Ok(()) => StreamError::Ended,
                Err(StreamError::ConsumerGone) => break,
                Err(e) => e,
            };
            tracing::error!(url = %self.url, error = %err, "Registry stream interrupted");

            let delivered = tokio::select! {
                sent = tx.send(Err(err)) => sent.is_ok(),
                _ = shutdown.recv() => break,
            };
            if !delivered {
                break;
            }

            tokio::select! {
                _ = sleep(self.reconnect_delay) => {}
                _ = shutdown.recv() => break,
            }
            tracing::info!(url = %self.url, "Reconnecting to registry");
        }

        tracing::info!("Registry watcher stopped");
    }

    /// One connection: returns `Ok(())` on clean end of stream.
    async fn stream_once(&self, tx: &mpsc::Sender<StreamEvent>) -> Result<(), StreamError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(StreamError::Connect)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status));
        }
        tracing::info!(url = %self.url, "Registry stream connected");

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StreamError::Read)?;
            lines.extend(&chunk);

            while let Some(line) = lines.next_line() {
                let Some(payload) = data_payload(&line) else {
                    continue;
                };
                match Snapshot::decode(payload) {
                    Ok(snapshot) => {
                        tracing::debug!(services = snapshot.len(), "Received registry snapshot");
                        tx.send(Ok(snapshot))
                            .await
                            .map_err(|_| StreamError::ConsumerGone)?;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Skipping malformed registry snapshot");
                    }
                }
            }

            if lines.pending() > MAX_LINE_BYTES {
                return Err(StreamError::LineTooLong(MAX_LINE_BYTES));
            }
        }

        Ok(())
    }
}

/// Build `http://<address><path>?watch=1`.
pub fn watch_url(address: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("http://{}", address))?.join(path)?;
    url.query_pairs_mut().append_pair("watch", "1");
    Ok(url)
}

/// Extract the value of a `data: <value>` line.
///
/// Keys and values are whitespace-trimmed; lines without a colon, with a
/// different key, or with an empty value yield `None`.
pub fn data_payload(line: &[u8]) -> Option<&str> {
    let line = std::str::from_utf8(line).ok()?;
    let (key, value) = line.trim().split_once(':')?;
    if key.trim() != "data" {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Accumulates body chunks and yields complete lines.
///
/// A trailing partial line left when the stream ends is discarded.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: BytesMut,
    /// Bytes at the front of `buf` already known to hold no newline.
    scanned: usize,
}

impl LineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<Bytes> {
        match self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                self.scanned = 0;
                Some(self.buf.split_to(end + 1).freeze())
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    fn pending(&self) -> usize {
        self.buf.len()
    }
}
