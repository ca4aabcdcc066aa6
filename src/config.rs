//! Environment configuration.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Postgres connection string. Without it the server keeps data in memory.
    pub database_url: Option<String>,
    /// NATS server for user notifications. Without it notifications are only logged.
    pub nats_url: Option<String>,
    pub port: u16,
    pub db_max_connections: u32,
    /// Records committed per bulk-import batch.
    pub bulk_batch_size: usize,
    /// Carrier stamped on shipments opened at pickup.
    pub shipment_carrier: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            nats_url: None,
            port: 8084,
            db_max_connections: 10,
            bulk_batch_size: Self::MIN_BATCH,
            shipment_carrier: "INTERNAL".to_string(),
        }
    }
}

impl Config {
    pub const MIN_BATCH: usize = 25;
    pub const MAX_BATCH: usize = 50;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            nats_url: non_empty("NATS_URL"),
            port: parse_or(non_empty("PORT"), "PORT", defaults.port)?,
            db_max_connections: parse_or(non_empty("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            bulk_batch_size: parse_or(non_empty("BULK_BATCH_SIZE"), "BULK_BATCH_SIZE", defaults.bulk_batch_size)?
                .clamp(Self::MIN_BATCH, Self::MAX_BATCH),
            shipment_carrier: non_empty("SHIPMENT_CARRIER").unwrap_or(defaults.shipment_carrier),
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError { var, value }),
    }
}
