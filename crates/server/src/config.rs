use crate::error::ServerResult;
use index::{BackendConfig, BackendKind, OpenSearchConfig, ReadinessConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for a single backend call in seconds
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Which backend to serve from
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub opensearch: OpenSearchConfig,

    /// Start-up probe budget
    #[serde(default)]
    pub readiness: ReadinessConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            backend_timeout_secs: default_backend_timeout_secs(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            backend: BackendKind::default(),
            opensearch: OpenSearchConfig::default(),
            readiness: ReadinessConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and config files
    ///
    /// `OPENSEARCH_HOST` and `OPENSEARCH_PORT` are honored on top of the
    /// prefixed `PREDSERVE_SERVER__*` variables.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("server").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("PREDSERVE_SERVER").separator("__"))
            .set_override_option("opensearch.host", std::env::var("OPENSEARCH_HOST").ok())?
            .set_override_option("opensearch.port", std::env::var("OPENSEARCH_PORT").ok())?;

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig::from_kind(self.backend, &self.opensearch)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_backend_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.backend_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.backend, BackendKind::OpenSearch);
        assert_eq!(cfg.opensearch.port, 9200);
        assert_eq!(cfg.readiness.max_attempts, 30);
        assert!(cfg.enable_cors);
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 8000);

        let cfg = ServerConfig {
            bind_addr: "not an address".into(),
            ..ServerConfig::default()
        };
        assert!(cfg.socket_addr().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: ServerConfig = serde_json::from_str(
            r#"{"port": 9000, "backend": "in_memory", "opensearch": {"host": "search"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.opensearch.host, "search");
        assert_eq!(cfg.opensearch.port, 9200);
        assert!(matches!(cfg.backend_config(), BackendConfig::InMemory));
    }
}
