//! Application configuration loaded from environment variables.

use std::str::FromStr;

use projections::StockPolicy;
use thiserror::Error;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}` (expected `text` or `json`)")),
        }
    }
}

/// A variable was set to a value that cannot be used.
#[derive(Debug, Error)]
#[error("Invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `REDIS_URL`: Redis index backend; unset selects the in-memory backend
/// - `STOCK_POLICY`: `last-timestamp` or `last-applied` (default: `last-timestamp`)
/// - `SEED_ON_START`: seed an empty index at startup (default: `true`)
/// - `STORE_CONNECT_RETRIES`: startup ping attempts against Redis (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub redis_url: Option<String>,
    pub stock_policy: StockPolicy,
    pub seed_on_start: bool,
    pub store_connect_retries: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", var("PORT"), defaults.port)?,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or("LOG_FORMAT", var("LOG_FORMAT"), defaults.log_format)?,
            redis_url: var("REDIS_URL"),
            stock_policy: parse_or("STOCK_POLICY", var("STOCK_POLICY"), defaults.stock_policy)?,
            seed_on_start: match var("SEED_ON_START") {
                Some(raw) => parse_bool("SEED_ON_START", &raw)?,
                None => defaults.seed_on_start,
            },
            store_connect_retries: parse_or(
                "STORE_CONNECT_RETRIES",
                var("STORE_CONNECT_RETRIES"),
                defaults.store_connect_retries,
            )?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            redis_url: None,
            stock_policy: StockPolicy::default(),
            seed_on_start: true,
            store_connect_retries: 5,
        }
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError {
            var,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError {
            var,
            reason: format!("expected a boolean, got `{other}`"),
        }),
    }
}
