use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short = 'f', long = "config", env = "MEDIAGATE_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Load and validate the configuration, then exit
    #[arg(long)]
    pub validate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    /// Redis holds both the work queue stream and the session records
    pub redis_url: String,
    pub queue: QueueConfig,
    pub sessions: SessionConfig,
    pub pricing: PricingConfig,
    pub auth: AuthConfig,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// Upper bound on any single ledger or job operation, including lock waits
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub stream: String,
    /// Approximate cap on stream length (`XADD MAXLEN ~`)
    pub max_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    pub cost_per_minute: Decimal,
}

/// Shared secrets for the two service principals. Neither has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Presented by the payment provider in `X-Service-API-Key`
    pub service_api_key: String,
    /// Presented by the worker fleet in `X-Internal-API-Key`
    pub internal_api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How long a job may sit in `pending` before it is re-published
    #[serde(with = "humantime_serde")]
    pub pending_threshold: Duration,
    pub batch_size: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database: DatabaseConfig::default(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            queue: QueueConfig::default(),
            sessions: SessionConfig::default(),
            pricing: PricingConfig::default(),
            auth: AuthConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/mediagate".to_string(),
            max_connections: 20,
            acquire_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stream: "mediagate:jobs".to_string(),
            max_len: 100_000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "octavia_session".to_string(),
            key_prefix: "sess:".to_string(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            cost_per_minute: Decimal::new(10, 2),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            pending_threshold: Duration::from_secs(300),
            batch_size: 100,
        }
    }
}

impl Config {
    /// Layer defaults, the YAML file at `args.config` (if present) and `MEDIAGATE_*` environment
    /// variables, then validate.
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Config = Self::figment(args).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(&args.config))
            // MEDIAGATE_DATABASE__URL -> database.url
            .merge(Env::prefixed("MEDIAGATE_").ignore(&["CONFIG"]).split("__"))
    }

    pub fn validate(&self) -> Result<(), figment::Error> {
        if self.auth.service_api_key.trim().is_empty() {
            return Err("auth.service_api_key must be set".to_string().into());
        }
        if self.auth.internal_api_key.trim().is_empty() {
            return Err("auth.internal_api_key must be set".to_string().into());
        }
        if self.auth.service_api_key == self.auth.internal_api_key {
            return Err("auth.service_api_key and auth.internal_api_key must differ".to_string().into());
        }
        if self.pricing.cost_per_minute < Decimal::ZERO {
            return Err("pricing.cost_per_minute must not be negative".to_string().into());
        }
        if self.database.max_connections == 0 {
            return Err("database.max_connections must be at least 1".to_string().into());
        }
        if self.database.operation_timeout.is_zero() {
            return Err("database.operation_timeout must be greater than zero".to_string().into());
        }
        if self.reconciliation.batch_size <= 0 {
            return Err("reconciliation.batch_size must be at least 1".to_string().into());
        }
        if self.reconciliation.interval.is_zero() {
            return Err("reconciliation.interval must be greater than zero".to_string().into());
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
