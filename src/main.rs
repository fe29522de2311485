//! Proxy configuration controller.
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!   lainlet watch    │  registry::RegistryStream                    │
//!   ────────────────▶│      │ snapshot (single slot)                │
//!                    │      ▼                                       │
//!                    │  routing::RoutingTableBuilder ◀── ssl/*.crt  │
//!                    │      │                                       │
//!                    │      ▼                                       │
//!                    │  nginx::RenderController                     │
//!                    │      │ server.conf / upstream.conf           │
//!                    │      ▼                                       │   SIGHUP
//!                    │  nginx -t ─────────────────────────────────────────────▶ nginx
//!                    │                                              │
//!                    │  health::HealthReporter ──▶ graphite/metrics │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;
use clap::Parser;

use webrouter::config::Overrides;
use webrouter::health::{Component, HealthFlag, HealthReporter};
use webrouter::lifecycle::{signals, startup, Shutdown};
use webrouter::nginx::{self, NginxProcess, NginxRenderer, RenderController};
use webrouter::observability::{logging, metrics};
use webrouter::registry::RegistryStream;
use webrouter::routing::RoutingTableBuilder;

#[derive(Debug, Parser)]
#[command(name = "webrouter", version, about = "Render and reload nginx from the service registry")]
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
        nginx_path = %config.nginx.path.display(),
        https = config.nginx.https,
        ab_test = config.nginx.ab_test,
        "webrouter v{} starting",
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

    let renderer = NginxRenderer::new(&config);
    let certificates = nginx::prepare(&config.nginx, &renderer).await?;

    let shutdown = Arc::new(Shutdown::new());
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        signals::wait_for_shutdown(&signal_shutdown).await;
    });

    let mut listener = shutdown.subscribe();
    let interval = Duration::from_millis(config.nginx.pid_wait_interval_ms);
    if !startup::wait_for_file(&config.nginx.pid_path, interval, &mut listener).await {
        tracing::info!("Shutdown before proxy started");
        return Ok(());
    }

    let component = Component::OpenResty {
        instance: config.observability.graphite.instance.clone(),
    };
    let health = HealthFlag::new(component.initial_state());
    let reporter = HealthReporter::new(health.clone(), component, &config.observability.graphite);
    let reporter = tokio::spawn(reporter.run(shutdown.subscribe()));

    let stream = RegistryStream::new(&config.registry)?;
    tracing::info!(url = %stream.url(), "Watching registry");
    let events = stream.spawn(shutdown.subscribe());

    let builder = match &certificates {
        Some(store) => RoutingTableBuilder::new().with_certificates(store),
        None => RoutingTableBuilder::new(),
    };
    let controller = RenderController::new(&config.nginx, renderer, NginxProcess::new(&config.nginx), health);
    nginx::service::run(events, builder, controller, shutdown.subscribe()).await;

    shutdown.trigger();
    if let Err(e) = reporter.await {
        tracing::error!(error = %e, "Health reporter task failed");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
