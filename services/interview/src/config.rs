//! Application Configuration Module
//!
//! Loads the interview runtime settings from the environment into a single
//! struct that `main` hands to the pieces that need it.

use std::time::Duration;
use tracing::Level;

/// Samples per chunk read from a WAV replay before it is forwarded.
pub const WAV_CHUNK_SAMPLES: usize = 1600;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub live_model: Option<String>,
    pub advisor_url: Option<String>,
    pub interview_duration: Duration,
    pub settle_delay: Duration,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `GEMINI_API_KEY`: Key for the live speech provider. Required.
    /// *   `LIVE_MODEL`: (Optional) Live model name. Defaults to the client's model.
    /// *   `ADVISOR_URL`: (Optional) WebSocket URL of the advisor. Without it no hints are used.
    /// *   `INTERVIEW_MINUTES`: (Optional) Target call length. Defaults to 30.
    /// *   `SETTLE_DELAY_MS`: (Optional) Pause between persona sessions. Defaults to 250.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let live_model = lookup("LIVE_MODEL").filter(|m| !m.trim().is_empty());
        let advisor_url = lookup("ADVISOR_URL").filter(|u| !u.trim().is_empty());

        let minutes = parse_or("INTERVIEW_MINUTES", lookup("INTERVIEW_MINUTES"), 30u64)?;
        if minutes == 0 {
            return Err(ConfigError::InvalidValue(
                "INTERVIEW_MINUTES".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let settle_ms = parse_or("SETTLE_DELAY_MS", lookup("SETTLE_DELAY_MS"), 250u64)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            gemini_api_key,
            live_model,
            advisor_url,
            interview_duration: Duration::from_secs(minutes * 60),
            settle_delay: Duration::from_millis(settle_ms),
            log_level,
        })
    }
}

fn parse_or(key: &str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "secret")])).unwrap();
        assert_eq!(config.gemini_api_key, "secret");
        assert_eq!(config.interview_duration, Duration::from_secs(1800));
        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.log_level, Level::INFO);
        assert!(config.advisor_url.is_none());
        assert!(config.live_model.is_none());
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "GEMINI_API_KEY"));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("ADVISOR_URL", "ws://localhost:3001/ws"),
            ("INTERVIEW_MINUTES", "15"),
            ("SETTLE_DELAY_MS", "400"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.advisor_url.as_deref(), Some("ws://localhost:3001/ws"));
        assert_eq!(config.interview_duration, Duration::from_secs(900));
        assert_eq!(config.settle_delay, Duration::from_millis(400));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "k"), ("INTERVIEW_MINUTES", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "INTERVIEW_MINUTES"));

        let err = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "k"), ("INTERVIEW_MINUTES", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(..)));

        let err = Config::from_lookup(lookup(&[("GEMINI_API_KEY", "k"), ("RUST_LOG", "loud")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref v, _) if v == "RUST_LOG"));
    }
}
