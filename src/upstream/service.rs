//! Snapshot consumer for the upstream synchronizer daemon.

use tokio::sync::mpsc;

use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;
use crate::registry::StreamEvent;
use crate::routing::pools_from_snapshot;
use crate::upstream::reconciler::UpstreamReconciler;
use crate::upstream::store::KvStore;

/// Consume snapshots in arrival order, fully syncing each before taking the next.
pub async fn run<S: KvStore>(
    mut events: mpsc::Receiver<StreamEvent>,
    reconciler: UpstreamReconciler<S>,
    mut shutdown: ShutdownListener,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = shutdown.recv() => break,
        };
        let Some(event) = event else {
            tracing::warn!("Registry watcher stopped, leaving sync loop");
            break;
        };

        let snapshot = match event {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // The watcher reconnects on its own; nothing to undo here.
                tracing::warn!(error = %e, "Registry stream error");
                metrics::record_snapshot("stream_error");
                continue;
            }
        };

        let pools = pools_from_snapshot(&snapshot);
        let report = reconciler.reconcile(&pools, &mut shutdown).await;
        metrics::record_snapshot(if report.is_success() { "applied" } else { "failed" });

        tracing::info!(
            pools = report.pools,
            added = report.added,
            removed = report.removed,
            failures = report.failures.len(),
            "Snapshot synced"
        );

        if report.cancelled {
            break;
        }
    }

    tracing::info!("Upstream sync loop stopped");
}
