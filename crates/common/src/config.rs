//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Federation configuration.
    pub federation: FederationConfig,
    /// Job queue configuration.
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Whether federation is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Instance name.
    pub instance_name: String,
    /// Whether to accept Linked-Data Signatures as a fallback when
    /// HTTP-signature verification fails.
    #[serde(default)]
    pub accept_ld_signatures: bool,
    /// Whether to embed an LD signature in outbound activity payloads.
    #[serde(default)]
    pub attach_ld_signatures: bool,
    /// Maximum concurrent inbound federation requests. Zero or negative
    /// disables the limit.
    #[serde(default = "default_inbound_concurrency")]
    pub max_inbound_concurrency: i64,
    /// Hosts federation is restricted to. Empty means allow all.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Hosts federation is refused for (host or subdomain match).
    #[serde(default)]
    pub blocked_hosts: Vec<String>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            instance_name: "sparrow".to_string(),
            accept_ld_signatures: false,
            attach_ld_signatures: false,
            max_inbound_concurrency: default_inbound_concurrency(),
            allowed_hosts: Vec::new(),
            blocked_hosts: Vec::new(),
        }
    }
}

/// Job queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Concurrent workers for the inbox queue.
    #[serde(default = "default_inbox_parallelism")]
    pub inbox_parallelism: usize,
    /// Concurrent workers for the pre-deliver queue.
    #[serde(default = "default_pre_deliver_parallelism")]
    pub pre_deliver_parallelism: usize,
    /// Concurrent workers for the deliver queue.
    #[serde(default = "default_deliver_parallelism")]
    pub deliver_parallelism: usize,
    /// Seconds a Running job may go without a worker heartbeat before it
    /// is reclaimed.
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,
    /// Seconds between claim attempts when the queue is empty.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Days completed jobs are kept before cleanup.
    #[serde(default = "default_completed_retention_days")]
    pub completed_retention_days: u32,
    /// Days failed jobs are kept before cleanup.
    #[serde(default = "default_failed_retention_days")]
    pub failed_retention_days: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbox_parallelism: default_inbox_parallelism(),
            pre_deliver_parallelism: default_pre_deliver_parallelism(),
            deliver_parallelism: default_deliver_parallelism(),
            claim_timeout_secs: default_claim_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            completed_retention_days: default_completed_retention_days(),
            failed_retention_days: default_failed_retention_days(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_true() -> bool {
    true
}

const fn default_inbound_concurrency() -> i64 {
    64
}

const fn default_inbox_parallelism() -> usize {
    4
}

const fn default_pre_deliver_parallelism() -> usize {
    2
}

const fn default_deliver_parallelism() -> usize {
    8
}

const fn default_claim_timeout_secs() -> u64 {
    300
}

const fn default_poll_interval_secs() -> u64 {
    2
}

const fn default_completed_retention_days() -> u32 {
    7
}

const fn default_failed_retention_days() -> u32 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `SPARROW_ENV`)
    /// 3. Environment variables with `SPARROW_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("SPARROW_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("SPARROW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_defaults() {
        let queue = QueueConfig::default();
        assert_eq!(queue.deliver_parallelism, 8);
        assert_eq!(queue.claim_timeout_secs, 300);
        assert!(queue.failed_retention_days > queue.completed_retention_days);
    }

    #[test]
    fn test_federation_defaults_from_toml() {
        let config: FederationConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"instance_name = "sparrow.test""#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.enabled);
        assert!(!config.accept_ld_signatures);
        assert_eq!(config.max_inbound_concurrency, 64);
        assert!(config.allowed_hosts.is_empty());
    }
}
