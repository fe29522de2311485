//! Render, validate and reload cycle for the proxy.
//!
//! # Flow
//! ```text
//! RoutingTable
//!     invalid                     → health down, nothing written
//!     servers == baseline         → health up, nothing written
//!     otherwise                   → write server.conf + upstream.conf
//!                                 → syntax check → reload
//!                                 → baseline = servers, health up
//! ```
//!
//! Any failure after the write leaves the baseline untouched, so the next
//! snapshot with the same servers is attempted again.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::NginxConfig;
use crate::health::HealthFlag;
use crate::nginx::process::{ProcessError, ProxyProcess};
use crate::nginx::render::ConfigRenderer;
use crate::observability::metrics;
use crate::routing::{RoutingTable, Server};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to render {artifact}: {error}")]
    Render { artifact: &'static str, error: fmt::Error },

    #[error("failed to write {path}: {error}")]
    Write { path: PathBuf, error: std::io::Error },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// What [`RenderController::apply`] did with a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The table carried a conflict.
    Rejected,
    /// Servers matched the last applied set.
    Unchanged,
    Reloaded,
}

pub struct RenderController<R, P> {
    renderer: R,
    process: P,
    server_conf: PathBuf,
    upstream_conf: PathBuf,
    baseline: Option<BTreeMap<String, Server>>,
    health: HealthFlag,
}

impl<R: ConfigRenderer, P: ProxyProcess> RenderController<R, P> {
    pub fn new(config: &NginxConfig, renderer: R, process: P, health: HealthFlag) -> Self {
        Self {
            renderer,
            process,
            server_conf: config.server_conf_path(),
            upstream_conf: config.upstream_conf_path(),
            baseline: None,
            health,
        }
    }

    /// Servers of the last table that was successfully reloaded.
    pub fn baseline(&self) -> Option<&BTreeMap<String, Server>> {
        self.baseline.as_ref()
    }

    pub fn health(&self) -> &HealthFlag {
        &self.health
    }

    pub async fn apply(&mut self, table: &RoutingTable) -> Result<ApplyOutcome, ControllerError> {
        if let Some(conflict) = &table.conflict {
            tracing::error!(%conflict, "Routing table rejected, keeping current proxy configuration");
            self.health.mark_down();
            return Ok(ApplyOutcome::Rejected);
        }

        // Pool membership is synced through the store; only server changes
        // need a reload.
        if self.baseline.as_ref() == Some(&table.servers) {
            tracing::debug!(servers = table.servers.len(), "Servers unchanged, skipping reload");
            self.health.mark_up();
            return Ok(ApplyOutcome::Unchanged);
        }

        match self.render_and_reload(table).await {
            Ok(()) => {
                metrics::record_reload(true);
                self.baseline = Some(table.servers.clone());
                self.health.mark_up();
                tracing::info!(
                    servers = table.servers.len(),
                    pools = table.pools.len(),
                    "Proxy configuration reloaded"
                );
                Ok(ApplyOutcome::Reloaded)
            }
            Err(e) => {
                metrics::record_reload(false);
                self.health.mark_down();
                Err(e)
            }
        }
    }

    async fn render_and_reload(&self, table: &RoutingTable) -> Result<(), ControllerError> {
        let servers = self
            .renderer
            .render_servers(table)
            .map_err(|error| ControllerError::Render { artifact: "server.conf", error })?;
        let upstreams = self
            .renderer
            .render_upstreams(table)
            .map_err(|error| ControllerError::Render { artifact: "upstream.conf", error })?;

        write_file(&self.server_conf, &servers).await?;
        write_file(&self.upstream_conf, &upstreams).await?;

        self.process.check_config().await?;
        self.process.reload().await?;
        Ok(())
    }
}

pub(crate) async fn write_file(path: &Path, contents: &str) -> Result<(), ControllerError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|error| ControllerError::Write {
            path: path.to_path_buf(),
            error,
        })
}
