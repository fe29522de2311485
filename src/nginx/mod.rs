//! Reverse proxy configuration control (the `webrouter` daemon).
//!
//! # Data Flow
//! ```text
//! Snapshot
//!     → routing::RoutingTableBuilder (servers, pools, certificates)
//!     → controller.rs (compare with baseline, render, check, reload)
//!     → render.rs ConfigRenderer (server.conf, upstream.conf)
//!     → process.rs ProxyProcess (`nginx -t`, SIGHUP via pid file)
//! ```

pub mod controller;
pub mod init;
pub mod process;
pub mod render;
pub mod service;

pub use controller::{ApplyOutcome, ControllerError, RenderController};
pub use init::{prepare, InitError};
pub use process::{NginxProcess, ProcessError, ProxyProcess};
pub use render::{ConfigRenderer, NginxRenderer};
