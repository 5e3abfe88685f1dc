use std::str::FromStr;
use std::time::Duration;
use anyhow::Context;

use crate::messaging::ORDER_CREATED_TOPIC;

/// Service configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub product_service_address: String,
    pub payment_service_address: String,
    pub notification_service_address: String,
    pub kafka_brokers: String,
    pub order_created_topic: String,
    pub metrics_port: u16,
    pub activity_timeout: Duration,
    pub activity_max_attempts: u32,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: number(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            product_service_address: text("PRODUCT_SERVICE_ADDRESS", "http://127.0.0.1:8081"),
            payment_service_address: text("PAYMENT_SERVICE_ADDRESS", "http://127.0.0.1:8082"),
            notification_service_address: text("NOTIFICATION_SERVICE_ADDRESS", "http://127.0.0.1:8083"),
            kafka_brokers: text("KAFKA_BROKERS", "127.0.0.1:9092"),
            order_created_topic: text("ORDER_CREATED_TOPIC", ORDER_CREATED_TOPIC),
            metrics_port: number(&lookup, "METRICS_PORT", 9090)?,
            activity_timeout: Duration::from_secs(number(&lookup, "ACTIVITY_TIMEOUT_SECS", 60)?),
            activity_max_attempts: number(&lookup, "ACTIVITY_MAX_ATTEMPTS", 5)?,
        })
    }
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {value:?}")),
    }
}
