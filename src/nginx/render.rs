//! Proxy configuration rendering.
//!
//! Three artifacts are produced:
//! - `nginx.conf`: rendered once at startup from static parameters
//! - `server.conf`: one `server` block per virtual host
//! - `upstream.conf`: one `upstream` block per pool
//!
//! Upstream blocks carry the snapshot's endpoints as initial members and
//! point the proxy at the Consul directory the synchronizer maintains, so
//! membership changes never need a reload.

use std::fmt::{self, Write};
use std::path::PathBuf;

use crate::config::WebrouterConfig;
use crate::routing::{Location, Pool, RoutingTable, Server};
use crate::upstream::pool_dir;

/// Produces the proxy's configuration text.
pub trait ConfigRenderer: Send + Sync {
    fn render_main(&self) -> Result<String, fmt::Error>;
    fn render_servers(&self, table: &RoutingTable) -> Result<String, fmt::Error>;
    fn render_upstreams(&self, table: &RoutingTable) -> Result<String, fmt::Error>;
}

/// Renderer for nginx/openresty with the upsync and upstream-check modules.
#[derive(Debug, Clone)]
pub struct NginxRenderer {
    nginx_path: PathBuf,
    log_path: PathBuf,
    pid_path: PathBuf,
    ssl_path: PathBuf,
    server_name: String,
    https: bool,
    ab_test: bool,
    server_names_hash_max_size: u32,
    server_names_hash_bucket_size: u32,
    check_shm_size: u32,
    consul_address: String,
    consul_prefix: String,
}

impl NginxRenderer {
    pub fn new(config: &WebrouterConfig) -> Self {
        let nginx = &config.nginx;
        Self {
            nginx_path: nginx.path.clone(),
            log_path: nginx.log_path.clone(),
            pid_path: nginx.pid_path.clone(),
            ssl_path: nginx.ssl_path.clone(),
            server_name: nginx.server_name.clone(),
            https: nginx.https,
            ab_test: nginx.ab_test,
            server_names_hash_max_size: nginx.server_names_hash_max_size,
            server_names_hash_bucket_size: nginx.server_names_hash_bucket_size,
            check_shm_size: nginx.check_shm_size,
            consul_address: config.consul.address.clone(),
            consul_prefix: config.consul.prefix.clone(),
        }
    }

    fn write_server(&self, out: &mut String, server: &Server) -> fmt::Result {
        writeln!(out, "server {{")?;
        writeln!(out, "    listen 80;")?;
        let certificate = server.certificate.as_deref().filter(|_| self.https);
        if certificate.is_some() {
            writeln!(out, "    listen 443 ssl;")?;
        }
        writeln!(out, "    server_name {};", server.hostname)?;
        if let Some(id) = certificate {
            writeln!(out, "    ssl_certificate {};", self.ssl_path.join(format!("{}.crt", id)).display())?;
            writeln!(out, "    ssl_certificate_key {};", self.ssl_path.join(format!("{}.key", id)).display())?;
        }
        writeln!(
            out,
            "    access_log {} main;",
            self.log_path.join(format!("{}.access.log", server.hostname)).display()
        )?;

        for (path, location) in &server.locations {
            self.write_location(out, path, location)?;
        }
        writeln!(out, "}}")?;
        writeln!(out)
    }

    fn write_location(&self, out: &mut String, path: &str, location: &Location) -> fmt::Result {
        let uri = if path == "/" {
            "/".to_string()
        } else {
            format!("/{}", path)
        };
        writeln!(out, "    location {} {{", uri)?;
        if location.https_only && self.https {
            writeln!(out, "        if ($scheme = http) {{")?;
            writeln!(out, "            return 301 https://$host$request_uri;")?;
            writeln!(out, "        }}")?;
        }
        if location.ab_test && self.ab_test {
            writeln!(out, "        set $canary_upstream {}_canary;", location.pool)?;
        }
        writeln!(out, "        proxy_set_header Host $host;")?;
        writeln!(out, "        proxy_set_header X-Real-IP $remote_addr;")?;
        writeln!(out, "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;")?;
        writeln!(out, "        proxy_pass http://{};", location.pool)?;
        writeln!(out, "    }}")
    }

    fn write_upstream(&self, out: &mut String, pool: &Pool) -> fmt::Result {
        writeln!(out, "upstream {} {{", pool.name)?;
        for endpoint in &pool.endpoints {
            writeln!(out, "    server {};", endpoint)?;
        }
        writeln!(
            out,
            "    upsync {}/v1/kv/{} upsync_timeout=6m upsync_interval=500ms upsync_type=consul strong_dependency=off;",
            self.consul_address,
            pool_dir(&self.consul_prefix, &pool.name)
        )?;
        writeln!(
            out,
            "    upsync_dump_path {};",
            self.nginx_path.join("upstreams").join(format!("{}.conf", pool.name)).display()
        )?;
        if let Some(check) = &pool.health_check {
            writeln!(out, "    check interval=3000 rise=2 fall=5 timeout=1000 type=http;")?;
            writeln!(out, "    check_http_send \"GET {} HTTP/1.0\\r\\n\\r\\n\";", check)?;
            writeln!(out, "    check_http_expect_alive http_2xx http_3xx;")?;
        }
        writeln!(out, "}}")?;
        writeln!(out)
    }
}

impl ConfigRenderer for NginxRenderer {
    fn render_main(&self) -> Result<String, fmt::Error> {
        let conf_dir = self.nginx_path.join("conf");
        let mut out = String::new();

        writeln!(out, "worker_processes auto;")?;
        writeln!(out, "pid {};", self.pid_path.display())?;
        writeln!(out, "error_log {};", self.log_path.join("error.log").display())?;
        writeln!(out)?;
        writeln!(out, "events {{")?;
        writeln!(out, "    worker_connections 10240;")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(out, "http {{")?;
        writeln!(out, "    include mime.types;")?;
        writeln!(out, "    server_names_hash_max_size {};", self.server_names_hash_max_size)?;
        writeln!(out, "    server_names_hash_bucket_size {};", self.server_names_hash_bucket_size)?;
        writeln!(out, "    check_shm_size {}M;", self.check_shm_size)?;
        writeln!(
            out,
            "    log_format main '$remote_addr - $remote_user [$time_local] \"$request\" $status $body_bytes_sent \"$http_referer\" \"$http_user_agent\" $upstream_addr $request_time';"
        )?;
        writeln!(out, "    access_log {} main;", self.log_path.join("access.log").display())?;
        writeln!(out)?;
        writeln!(out, "    server {{")?;
        writeln!(out, "        listen 80 default_server;")?;
        writeln!(out, "        server_name {};", self.server_name)?;
        writeln!(out, "        location /nginx_status {{")?;
        writeln!(out, "            stub_status on;")?;
        writeln!(out, "        }}")?;
        writeln!(out, "        location / {{")?;
        writeln!(out, "            return 404;")?;
        writeln!(out, "        }}")?;
        writeln!(out, "    }}")?;
        writeln!(out)?;
        writeln!(out, "    include {};", conf_dir.join("upstream.conf").display())?;
        writeln!(out, "    include {};", conf_dir.join("server.conf").display())?;
        writeln!(out, "}}")?;
        Ok(out)
    }

    fn render_servers(&self, table: &RoutingTable) -> Result<String, fmt::Error> {
        let mut out = String::new();
        for server in table.servers.values() {
            self.write_server(&mut out, server)?;
        }
        Ok(out)
    }

    fn render_upstreams(&self, table: &RoutingTable) -> Result<String, fmt::Error> {
        let mut out = String::new();
        for pool in table.pools.values() {
            self.write_upstream(&mut out, pool)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::routing::SENTINEL_ENDPOINT;

    fn renderer(https: bool, ab_test: bool) -> NginxRenderer {
        let mut config = WebrouterConfig::default();
        config.nginx.path = PathBuf::from("/opt/nginx/");
        config.nginx.ssl_path = PathBuf::from("/etc/nginx/ssl/");
        config.nginx.https = https;
        config.nginx.ab_test = ab_test;
        NginxRenderer::new(&config)
    }

    fn table() -> RoutingTable {
        let mut locations = BTreeMap::new();
        locations.insert(
            "/".to_string(),
            Location { pool: "shop_web_web".into(), https_only: true, ab_test: true },
        );
        locations.insert(
            "cart".to_string(),
            Location { pool: "shop_cart_web".into(), https_only: false, ab_test: false },
        );
        let mut servers = BTreeMap::new();
        servers.insert(
            "shop.io".to_string(),
            Server { hostname: "shop.io".into(), certificate: Some("shop".into()), locations },
        );

        let mut pools = BTreeMap::new();
        pools.insert(
            "shop_web_web".to_string(),
            Pool::new("shop_web_web", Some("/ping".into()), vec!["10.0.0.1:8080".parse().unwrap()]),
        );
        pools.insert("shop_cart_web".to_string(), Pool::new("shop_cart_web", None, Vec::new()));

        RoutingTable { servers, pools, conflict: None }
    }

    #[test]
    fn test_render_servers_with_tls() {
        let out = renderer(true, true).render_servers(&table()).unwrap();
        assert!(out.contains("server_name shop.io;"));
        assert!(out.contains("listen 443 ssl;"));
        assert!(out.contains("ssl_certificate /etc/nginx/ssl/shop.crt;"));
        assert!(out.contains("ssl_certificate_key /etc/nginx/ssl/shop.key;"));
        assert!(out.contains("location / {"));
        assert!(out.contains("location /cart {"));
        assert!(out.contains("return 301 https://$host$request_uri;"));
        assert!(out.contains("set $canary_upstream shop_web_web_canary;"));
        assert!(out.contains("proxy_pass http://shop_cart_web;"));
    }

    #[test]
    fn test_render_servers_plain() {
        let out = renderer(false, false).render_servers(&table()).unwrap();
        assert!(!out.contains("ssl"));
        assert!(!out.contains("return 301"));
        assert!(!out.contains("canary"));
    }

    #[test]
    fn test_render_upstreams() {
        let out = renderer(false, false).render_upstreams(&table()).unwrap();
        assert!(out.contains("upstream shop_web_web {"));
        assert!(out.contains("server 10.0.0.1:8080;"));
        assert!(out.contains(&format!("server {};", SENTINEL_ENDPOINT)));
        assert!(out.contains("upsync consul.lain:8500/v1/kv/lain/webrouter/upstreams/shop_cart_web/"));
        assert!(out.contains("upsync_dump_path /opt/nginx/upstreams/shop_cart_web.conf;"));
        assert!(out.contains("check_http_send \"GET /ping HTTP/1.0\\r\\n\\r\\n\";"));
        assert_eq!(out.matches("check interval").count(), 1);
    }

    #[test]
    fn test_upsync_dir_matches_store_layout() {
        let mut config = WebrouterConfig::default();
        config.consul.prefix = "lain/webrouter/upstreams".to_string();
        let out = NginxRenderer::new(&config).render_upstreams(&table()).unwrap();

        let dir = pool_dir(&config.consul.prefix, "shop_cart_web");
        assert_eq!(dir, "lain/webrouter/upstreams/shop_cart_web/");
        assert!(out.contains(&format!("upsync consul.lain:8500/v1/kv/{} ", dir)));
        assert!(!out.contains("upstreamsshop_cart_web"));
    }

    #[test]
    fn test_render_main() {
        let out = renderer(false, false).render_main().unwrap();
        assert!(out.contains("pid /var/run/nginx.pid;"));
        assert!(out.contains("server_names_hash_max_size 512;"));
        assert!(out.contains("server_name localhost;"));
        assert!(out.contains("include /opt/nginx/conf/upstream.conf;"));
        assert!(out.contains("include /opt/nginx/conf/server.conf;"));
    }
}
