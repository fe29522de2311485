//! Snapshot consumer for the render controller daemon.

use tokio::sync::mpsc;

use crate::lifecycle::ShutdownListener;
use crate::nginx::controller::{ApplyOutcome, RenderController};
use crate::nginx::process::ProxyProcess;
use crate::nginx::render::ConfigRenderer;
use crate::observability::metrics;
use crate::registry::StreamEvent;
use crate::routing::RoutingTableBuilder;

/// Build a table from each snapshot and hand it to the controller.
pub async fn run<R: ConfigRenderer, P: ProxyProcess>(
    mut events: mpsc::Receiver<StreamEvent>,
    builder: RoutingTableBuilder<'_>,
    mut controller: RenderController<R, P>,
    mut shutdown: ShutdownListener,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = shutdown.recv() => break,
        };
        let Some(event) = event else {
            tracing::warn!("Registry watcher stopped, leaving render loop");
            break;
        };

        let snapshot = match event {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Registry stream error");
                controller.health().mark_down();
                metrics::record_snapshot("stream_error");
                continue;
            }
        };

        let table = builder.build(&snapshot);
        let outcome = match controller.apply(&table).await {
            Ok(ApplyOutcome::Rejected) => "rejected",
            Ok(ApplyOutcome::Unchanged) => "unchanged",
            Ok(ApplyOutcome::Reloaded) => "applied",
            Err(e) => {
                tracing::error!(error = %e, "Failed to apply routing table");
                "failed"
            }
        };
        metrics::record_snapshot(outcome);
    }

    tracing::info!("Render loop stopped");
}
