//! Command-line and environment overrides.
//!
//! Each flag also reads the environment variable the deployment already sets,
//! so a container can be configured without a config file.

use std::path::PathBuf;
use clap::builder::BoolishValueParser;
use clap::Args;
use crate::config::loader::{load_or_default, ConfigError};
use crate::config::schema::WebrouterConfig;
use crate::config::validation::validate_config;

/// Overrides shared by both daemons.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "WEBROUTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registry address (host:port).
    #[arg(long, env = "LAINLET_ADDR")]
    pub lainlet: Option<String>,

    /// Consul address (host:port).
    #[arg(long, env = "CONSUL_ADDR")]
    pub consul: Option<String>,

    /// Consul key prefix for pool membership.
    #[arg(long, env = "CONSUL_KEY_PREFIX")]
    pub prefix: Option<String>,

    /// Proxy prefix directory.
    #[arg(long, env = "NGINX_PATH")]
    pub nginx: Option<PathBuf>,

    /// Proxy pid file.
    #[arg(long, env = "NGINX_PID_PATH")]
    pub pid: Option<PathBuf>,

    /// Proxy log directory.
    #[arg(long, env = "NGINX_LOG_PATH")]
    pub log: Option<PathBuf>,

    /// Certificate directory.
    #[arg(long, env = "NGINX_SSL_PATH")]
    pub ssl: Option<PathBuf>,

    /// Default server name.
    #[arg(long, env = "NGINX_SERVER_NAME")]
    pub server_name: Option<String>,

    #[arg(long, env = "HTTPS", value_parser = BoolishValueParser::new())]
    pub https: Option<bool>,

    #[arg(long, env = "AB_TEST", value_parser = BoolishValueParser::new())]
    pub ab_test: Option<bool>,

    #[arg(long, env = "SERVER_NAMES_HASH_MAX_SIZE")]
    pub server_names_hash_max_size: Option<u32>,

    #[arg(long, env = "SERVER_NAMES_HASH_BUCKET_SIZE")]
    pub server_names_hash_bucket_size: Option<u32>,

    #[arg(long, env = "CHECK_SHM_SIZE")]
    pub check_shm_size: Option<u32>,

    /// Force debug logging.
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: Option<bool>,

    #[arg(long, env = "GRAPHITE_ENABLE", value_parser = BoolishValueParser::new())]
    pub graphite: Option<bool>,

    #[arg(long, env = "GRAPHITE_HOST")]
    pub graphite_host: Option<String>,

    #[arg(long, env = "GRAPHITE_PORT")]
    pub graphite_port: Option<u16>,

    /// Cluster domain used in health metric keys.
    #[arg(long, env = "LAIN_DOMAIN")]
    pub domain: Option<String>,

    /// Instance number used in per-instance health metric keys.
    #[arg(long, env = "DEPLOYD_POD_INSTANCE_NO")]
    pub instance: Option<String>,
}

impl Overrides {
    /// Load the configuration file (if any), apply overrides and validate.
    pub fn resolve(&self) -> Result<WebrouterConfig, ConfigError> {
        let mut config = load_or_default(self.config.as_deref())?;
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Apply every override that was set.
    pub fn apply(&self, config: &mut WebrouterConfig) {
        set(&mut config.registry.address, &self.lainlet);
        set(&mut config.consul.address, &self.consul);
        set(&mut config.consul.prefix, &self.prefix);

        let nginx = &mut config.nginx;
        set(&mut nginx.path, &self.nginx);
        set(&mut nginx.pid_path, &self.pid);
        set(&mut nginx.log_path, &self.log);
        set(&mut nginx.ssl_path, &self.ssl);
        set(&mut nginx.server_name, &self.server_name);
        set(&mut nginx.https, &self.https);
        set(&mut nginx.ab_test, &self.ab_test);
        set(&mut nginx.server_names_hash_max_size, &self.server_names_hash_max_size);
        set(&mut nginx.server_names_hash_bucket_size, &self.server_names_hash_bucket_size);
        set(&mut nginx.check_shm_size, &self.check_shm_size);

        if self.debug == Some(true) {
            config.observability.log_level = "debug".to_string();
        }

        let graphite = &mut config.observability.graphite;
        set(&mut graphite.enabled, &self.graphite);
        set(&mut graphite.host, &self.graphite_host);
        set(&mut graphite.port, &self.graphite_port);
        set(&mut graphite.domain, &self.domain);
        set(&mut graphite.instance, &self.instance);
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        overrides: Overrides,
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = TestCli::parse_from([
            "test",
            "--lainlet",
            "127.0.0.1:9001",
            "--prefix",
            "test/upstreams/",
            "--https",
            "true",
            "--debug",
            "true",
        ]);

        let mut config = WebrouterConfig::default();
        cli.overrides.apply(&mut config);

        assert_eq!(config.registry.address, "127.0.0.1:9001");
        assert_eq!(config.consul.prefix, "test/upstreams/");
        assert!(config.nginx.https);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_unset_overrides_are_noop() {
        let mut config = WebrouterConfig::default();
        Overrides::default().apply(&mut config);
        assert_eq!(config.nginx.server_name, "localhost");
        assert!(!config.observability.graphite.enabled);
    }
}
