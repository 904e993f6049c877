//! Application configuration loaded from environment variables.

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Base URL of the payment gateway
    pub gateway_url: String,
    /// Secret key presented to the payment gateway as a bearer token
    pub gateway_secret: String,
    /// ISO currency code sent with payment intents
    pub currency: String,
    /// Smallest accepted pledge, in minor currency units
    pub min_pledge: i64,
    /// How often (in seconds) the deadline sweeper scans for completed projects
    pub sweep_interval_secs: u64,
    /// Capacity of the outbound notification queue
    pub notify_queue_size: usize,
    /// How long (in seconds) shutdown waits for the notification queue to drain
    pub shutdown_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./crowdfund.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid API_PORT".to_string()))?,
            gateway_url: env_var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:4242".to_string()),
            gateway_secret: env_var("GATEWAY_SECRET_KEY").map_err(|_| {
                AppError::Config("GATEWAY_SECRET_KEY environment variable is required".to_string())
            })?,
            currency: env_var("CURRENCY").unwrap_or_else(|_| "dzd".to_string()),
            min_pledge: env_var("MIN_PLEDGE")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid MIN_PLEDGE".to_string()))?,
            sweep_interval_secs: env_var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid SWEEP_INTERVAL_SECS".to_string()))?,
            notify_queue_size: env_var("NOTIFY_QUEUE_SIZE")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid NOTIFY_QUEUE_SIZE".to_string()))?,
            shutdown_grace_secs: env_var("SHUTDOWN_GRACE_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid SHUTDOWN_GRACE_SECS".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("Missing env var: {key}")))
}
