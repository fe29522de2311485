//! Upstream membership synchronizer.
//!
//! Watches the registry and mirrors each pool's live endpoints into Consul
//! under `<prefix><pool>/<ip:port>`. The proxy's upsync module follows those
//! keys, so endpoint churn never needs a reload.

use std::sync::Arc;
use clap::Parser;

use webrouter::config::Overrides;
use webrouter::health::{Component, HealthFlag, HealthReporter};
use webrouter::lifecycle::{signals, Shutdown};
use webrouter::observability::{logging, metrics};
use webrouter::registry::RegistryStream;
use webrouter::resilience::RetryPolicy;
use webrouter::upstream::{self, ConsulKv, UpstreamReconciler};

#[derive(Debug, Parser)]
#[command(name = "webrouter-confd", version, about = "Sync upstream pool membership into Consul")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.overrides.resolve()?;

    logging::init(&config.observability.log_level);
    tracing::info!(
        registry = %config.registry.address,
        consul = %config.consul.address,
        prefix = %config.consul.prefix,
        max_attempts = config.retry.max_attempts,
        "webrouter-confd v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        signals::wait_for_shutdown(&signal_shutdown).await;
    });

    let component = Component::Confd;
    let health = HealthFlag::new(component.initial_state());
    let reporter = HealthReporter::new(health.clone(), component, &config.observability.graphite);
    let reporter = tokio::spawn(reporter.run(shutdown.subscribe()));

    let store = ConsulKv::new(&config.consul)?;
    let reconciler = UpstreamReconciler::new(
        store,
        config.consul.prefix.clone(),
        RetryPolicy::from(&config.retry),
        health,
    );

    let stream = RegistryStream::new(&config.registry)?;
    tracing::info!(url = %stream.url(), "Watching registry");
    let events = stream.spawn(shutdown.subscribe());

    upstream::service::run(events, reconciler, shutdown.subscribe()).await;

    shutdown.trigger();
    if let Err(e) = reporter.await {
        tracing::error!(error = %e, "Health reporter task failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
