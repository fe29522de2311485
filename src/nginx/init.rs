//! One-time preparation of the proxy prefix directory.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::NginxConfig;
use crate::nginx::controller::{write_file, ControllerError};
use crate::nginx::render::ConfigRenderer;
use crate::routing::{CertificateError, CertificateStore};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to create {path}: {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error("failed to prepare nginx.conf: {0}")]
    MainConf(#[from] ControllerError),

    #[error(transparent)]
    Certificates(#[from] CertificateError),
}

/// Lay out the prefix directory.
///
/// - `conf/nginx.conf` rendered from static parameters
/// - empty `conf/server.conf` and `conf/upstream.conf`
/// - the `upstreams/` dump directory
/// - the `lock` file shared with the proxy's lua code
///
/// Returns the certificate store when TLS is enabled.
pub async fn prepare<R: ConfigRenderer>(
    config: &NginxConfig,
    renderer: &R,
) -> Result<Option<CertificateStore>, InitError> {
    let conf_dir = config.conf_dir();
    create_dir(&conf_dir).await?;

    let main = renderer
        .render_main()
        .map_err(|error| ControllerError::Render { artifact: "nginx.conf", error })?;
    write_file(&config.main_conf_path(), &main).await?;
    write_file(&config.server_conf_path(), "").await?;
    write_file(&config.upstream_conf_path(), "").await?;

    create_dir(&config.path.join("upstreams")).await?;
    write_file(&config.path.join("lock"), "").await?;

    if !config.https {
        return Ok(None);
    }
    let store = CertificateStore::load(&config.ssl_path)?;
    tracing::info!(certificates = ?store.ids().collect::<Vec<_>>(), "Loaded certificates");
    Ok(Some(store))
}

async fn create_dir(path: &std::path::Path) -> Result<(), InitError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|error| InitError::Io {
            path: path.to_path_buf(),
            error,
        })
}
