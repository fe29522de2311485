//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → cli.rs (flag / environment overrides)
//!     → validation.rs (semantic checks)
//!     → WebrouterConfig (validated, immutable)
//!     → passed by reference to every subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Overrides;
pub use loader::ConfigError;
pub use schema::WebrouterConfig;
pub use schema::{ConsulConfig, GraphiteConfig, NginxConfig, RegistryConfig, RetryConfig};
