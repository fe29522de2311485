//! Control of the running proxy process.

use std::path::PathBuf;
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::process::Command;

use crate::config::NginxConfig;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to run {binary}: {error}")]
    Spawn { binary: String, error: std::io::Error },

    #[error("configuration check failed: {0}")]
    CheckFailed(String),

    #[error("failed to read pid file {path}: {error}")]
    PidFile { path: String, error: std::io::Error },

    #[error("invalid pid {0:?}")]
    InvalidPid(String),

    #[error("failed to signal pid {pid}: {error}")]
    Signal { pid: i32, error: nix::Error },
}

/// Operations on the proxy the render controller depends on.
#[async_trait]
pub trait ProxyProcess: Send + Sync {
    /// Validate the configuration currently on disk.
    async fn check_config(&self) -> Result<(), ProcessError>;

    /// Ask the running proxy to reload its configuration.
    async fn reload(&self) -> Result<(), ProcessError>;
}

/// The nginx/openresty master process, addressed through its pid file.
#[derive(Debug, Clone)]
pub struct NginxProcess {
    binary: PathBuf,
    main_conf: PathBuf,
    pid_path: PathBuf,
}

impl NginxProcess {
    pub fn new(config: &NginxConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            main_conf: config.main_conf_path(),
            pid_path: config.pid_path.clone(),
        }
    }

    async fn read_pid(&self) -> Result<i32, ProcessError> {
        let raw = tokio::fs::read_to_string(&self.pid_path)
            .await
            .map_err(|error| ProcessError::PidFile {
                path: self.pid_path.display().to_string(),
                error,
            })?;
        parse_pid(&raw)
    }
}

#[async_trait]
impl ProxyProcess for NginxProcess {
    async fn check_config(&self) -> Result<(), ProcessError> {
        let output = Command::new(&self.binary)
            .arg("-t")
            .arg("-c")
            .arg(&self.main_conf)
            .output()
            .await
            .map_err(|error| ProcessError::Spawn {
                binary: self.binary.display().to_string(),
                error,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ProcessError::CheckFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn reload(&self) -> Result<(), ProcessError> {
        let pid = self.read_pid().await?;
        kill(Pid::from_raw(pid), Signal::SIGHUP).map_err(|error| ProcessError::Signal { pid, error })?;
        tracing::debug!(pid, "Sent SIGHUP to proxy");
        Ok(())
    }
}

/// Parse the contents of a pid file.
pub fn parse_pid(raw: &str) -> Result<i32, ProcessError> {
    let trimmed = raw.trim();
    match trimmed.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(ProcessError::InvalidPid(trimmed.to_string())),
    }
}
