//! Application configuration
//!
//! Configuration is loaded with the `config` crate from built-in defaults,
//! optional `config/default` and `config/{RUN_MODE}` files, and `LEDGER__*`
//! environment variables.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Comma-separated allowed CORS origins; empty allows none
    #[serde(default)]
    pub cors_origins: String,
}

impl ServerConfig {
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply embedded migrations at startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

/// Service-to-service authentication
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Shared token expected in the `X-Service-Token` header
    pub service_token: String,
}

/// Token shipped in sample env files; never accepted at startup
const PLACEHOLDER_SERVICE_TOKEN: &str = "change-me";

impl AuthConfig {
    /// Whether a real token has been set
    pub fn is_configured(&self) -> bool {
        let token = self.service_token.trim();
        !token.is_empty() && token != PLACEHOLDER_SERVICE_TOKEN
    }
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Rate key charged daily per published store
    #[serde(default = "default_store_service_key")]
    pub store_service_key: String,

    /// Rate key charged daily per active custom domain
    #[serde(default = "default_domain_service_key")]
    pub domain_service_key: String,

    /// Store cost used when the rate lookup fails
    #[serde(default = "default_store_fallback_cost")]
    pub store_fallback_cost: Decimal,

    /// Domain cost used when the rate lookup fails
    #[serde(default = "default_domain_fallback_cost")]
    pub domain_fallback_cost: Decimal,

    /// Insert the built-in rates at startup when missing
    #[serde(default = "default_true")]
    pub seed_rates: bool,
}

fn default_store_service_key() -> String {
    "published_store".to_string()
}

fn default_domain_service_key() -> String {
    "custom_domain".to_string()
}

fn default_store_fallback_cost() -> Decimal {
    Decimal::new(100, 2)
}

fn default_domain_fallback_cost() -> Decimal {
    Decimal::new(50, 2)
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            store_service_key: default_store_service_key(),
            domain_service_key: default_domain_service_key(),
            store_fallback_cost: default_store_fallback_cost(),
            domain_fallback_cost: default_domain_fallback_cost(),
            seed_rates: true,
        }
    }
}

/// In-process billing timer
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Run the fleet billing cycle from inside the server process
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    3600
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.timeout_secs", 30)?
            .set_default("server.cors_origins", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", true)?
            .set_default("billing.store_service_key", "published_store")?
            .set_default("billing.domain_service_key", "custom_domain")?
            .set_default("billing.store_fallback_cost", "1.00")?
            .set_default("billing.domain_fallback_cost", "0.50")?
            .set_default("billing.seed_rates", true)?
            .set_default("scheduler.enabled", false)?
            .set_default("scheduler.interval_secs", 3600)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("LEDGER").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_default_billing_config() {
        let config = BillingConfig::default();
        assert_eq!(config.store_service_key, "published_store");
        assert_eq!(config.domain_fallback_cost, Decimal::new(50, 2));
        assert!(config.seed_rates);
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                r#"
                [server]
                port = 9090

                [database]
                url = "postgres://localhost/ledger"

                [auth]
                service_token = "secret"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server_addr(), "0.0.0.0:9090");
        assert!(config.database.run_migrations);
        assert_eq!(config.billing.store_fallback_cost, Decimal::new(100, 2));
        assert!(!config.scheduler.enabled);
        assert!(config.server.cors_origin_list().is_empty());
    }

    #[test]
    fn test_cors_origin_list() {
        let server = ServerConfig {
            host: default_host(),
            port: default_port(),
            workers: 1,
            timeout_secs: default_timeout(),
            cors_origins: "https://admin.example.com, ,https://ops.example.com".to_string(),
        };
        assert_eq!(
            server.cors_origin_list(),
            vec!["https://admin.example.com", "https://ops.example.com"]
        );
    }

    #[test]
    fn test_placeholder_token_is_not_configured() {
        let auth = |token: &str| AuthConfig {
            service_token: token.to_string(),
        };
        assert!(!auth("").is_configured());
        assert!(!auth("   ").is_configured());
        assert!(!auth("change-me").is_configured());
        assert!(auth("3f9c1d2e").is_configured());
    }
}
