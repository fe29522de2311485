//! Periodic health publishing.
//!
//! # Responsibilities
//! - Read the shared health flag on a fixed interval
//! - Publish it to graphite (when configured) and the metrics registry

use std::time::Duration;
use tokio::time;

use crate::config::GraphiteConfig;
use crate::health::graphite::{Component, GraphiteClient};
use crate::health::state::HealthFlag;
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;

pub struct HealthReporter {
    flag: HealthFlag,
    component: Component,
    interval: Duration,
    graphite: Option<(GraphiteClient, String)>,
}

impl HealthReporter {
    pub fn new(flag: HealthFlag, component: Component, config: &GraphiteConfig) -> Self {
        let graphite = config.enabled.then(|| {
            (
                GraphiteClient::new(config.host.clone(), config.port),
                component.health_key(&config.domain),
            )
        });

        Self {
            flag,
            component,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            graphite,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownListener) {
        tracing::info!(
            component = self.component.label(),
            interval_secs = self.interval.as_secs(),
            graphite = self.graphite.is_some(),
            "Health reporter starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick fires immediately; skip it so the first report
        // reflects at least one processed snapshot.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.report().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health reporter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn report(&self) {
        let state = self.flag.get();
        metrics::record_health(self.component.label(), state);

        if let Some((client, key)) = &self.graphite {
            if let Err(e) = client.send(key, state.as_metric()).await {
                tracing::warn!(key = %key, error = %e, "Failed to send health to graphite");
            }
        }
    }
}
