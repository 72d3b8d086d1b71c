use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub interview_duration: Duration,
    /// How often each connection is sent a `time_update`.
    pub tick_interval: Duration,
    pub log_filter: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3001".
    /// *   `INTERVIEW_MINUTES`: (Optional) Target interview length. Defaults to 30.
    /// *   `TIME_UPDATE_SECS`: (Optional) Interval between time updates. Defaults to 10.
    /// *   `RUST_LOG`: (Optional) A level or filter directive. Defaults to "info".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3001".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let minutes = positive(&lookup, "INTERVIEW_MINUTES", 30)?;
        let tick_secs = positive(&lookup, "TIME_UPDATE_SECS", 10)?;

        let log_filter = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(&log_filter)
            .map_err(|e| ConfigError::InvalidValue("RUST_LOG".to_string(), e.to_string()))?;

        Ok(Self {
            bind_address,
            interview_duration: Duration::from_secs(minutes * 60),
            tick_interval: Duration::from_secs(tick_secs),
            log_filter,
        })
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue(key.to_string(), "must be at least 1".to_string())),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}
