use std::env;
use std::net::SocketAddr;

use thiserror::Error;

use crate::ledger::UnboundedCapacityPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub currency: String,
    pub capacity_policy: UnboundedCapacityPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/ticket_ledger".to_string()),
            max_connections: parse("DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: parse("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001)))?,
            currency: env::var("LEDGER_CURRENCY")
                .map(|c| c.trim().to_lowercase())
                .unwrap_or_else(|_| "usd".to_string()),
            capacity_policy: parse("UNBOUNDED_CAPACITY_POLICY", UnboundedCapacityPolicy::default())?,
        })
    }
}

fn parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
