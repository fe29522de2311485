//! Startup orchestration helpers.
//!
//! # Responsibilities
//! - Block until the proxy has written its pid file
//! - Stay cancellable while waiting

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use crate::lifecycle::ShutdownListener;

/// Poll until `path` exists.
///
/// Returns `false` if shutdown was triggered first.
pub async fn wait_for_file(path: &Path, interval: Duration, shutdown: &mut ShutdownListener) -> bool {
    loop {
        match tokio::fs::metadata(path).await {
            Ok(_) => {
                tracing::info!(path = %path.display(), "Found proxy pid file");
                return true;
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Waiting for proxy pid file");
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.recv() => return false,
        }
    }
}
