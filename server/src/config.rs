//! Configuration management for the agent.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tether_engine::{ClientConfig, RetryPolicy, MIN_PROBE_INTERVAL};

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// SQLite URL of the offline queue
    pub database_url: String,
    /// Base URL of the remote API
    pub upstream_url: String,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each backoff delay that may be shaved off at random
    pub retry_jitter: f64,
    /// Queue offline and exhausted calls for replay
    pub offline_storage: bool,
    /// How often the upstream is probed for reachability
    pub probe_interval: Duration,
    /// Timeout of a single upstream attempt
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("PORT", 3030)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://tether.db?mode=rwc".to_string());
        let upstream_url = env::var("UPSTREAM_URL").map_err(|_| ConfigError::Missing("UPSTREAM_URL"))?;

        let retry_jitter: f64 = parse_or("RETRY_JITTER", 0.1)?;
        if !(0.0..=1.0).contains(&retry_jitter) {
            return Err(ConfigError::Invalid {
                var: "RETRY_JITTER",
                value: retry_jitter.to_string(),
            });
        }

        let probe_interval = Duration::from_secs(parse_or("PROBE_INTERVAL_SECS", 5)?);

        Ok(Self {
            host,
            port,
            database_url,
            upstream_url,
            max_retries: parse_or("MAX_RETRIES", 3)?,
            base_delay: Duration::from_millis(parse_or("BASE_DELAY_MS", 1000)?),
            max_delay: Duration::from_millis(parse_or("MAX_DELAY_MS", 10_000)?),
            retry_jitter,
            offline_storage: parse_or("OFFLINE_STORAGE", true)?,
            probe_interval: probe_interval.max(MIN_PROBE_INTERVAL),
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 15)?),
        })
    }

    /// Settings for the hosted client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            retry: RetryPolicy::new(self.max_retries, self.base_delay, self.max_delay)
                .with_jitter(self.retry_jitter),
            offline_storage: self.offline_storage,
        }
    }
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_uses_default_when_unset() {
        let value: u32 = parse_or("TETHER_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn invalid_value_names_variable() {
        let err = ConfigError::Invalid {
            var: "PORT",
            value: "http".into(),
        };
        assert_eq!(err.to_string(), "invalid value for PORT: \"http\"");
    }

    #[test]
    fn client_config_carries_policy() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 3030,
            database_url: "sqlite::memory:".into(),
            upstream_url: "http://localhost:8080".into(),
            max_retries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            retry_jitter: 0.0,
            offline_storage: false,
            probe_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        };

        let client = config.client_config();
        assert!(!client.offline_storage);
        assert_eq!(client.retry.max_retries, 5);
        assert_eq!(client.retry.backoff(3), Duration::from_millis(1600));
        assert_eq!(client.retry.backoff(4), Duration::from_secs(2));
    }
}
