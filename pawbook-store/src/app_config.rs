use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub reservations: ReservationRules,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Which gateway adapter to wire up. Only `mock` ships with the service.
    #[serde(default = "default_payment_provider")]
    pub provider: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            provider: default_payment_provider(),
        }
    }
}

fn default_payment_provider() -> String { "mock".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationRules {
    /// How long a hold keeps its unit before the sweeper may reclaim it.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
    /// Capacity used when neither an override nor a default is configured.
    #[serde(default = "default_fallback_capacity")]
    pub fallback_capacity: u32,
}

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
            fallback_capacity: default_fallback_capacity(),
        }
    }
}

fn default_ttl_minutes() -> u64 { 10 }
fn default_fallback_capacity() -> u32 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_interval_seconds() -> u64 { 60 }
fn default_batch_size() -> usize { 500 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `PAWBOOK_RESERVATIONS__TTL_MINUTES=15`
            .add_source(config::Environment::with_prefix("PAWBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
