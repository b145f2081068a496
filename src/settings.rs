//! Typed, environment-backed configuration. A `.env` file is loaded
//! non-fatally via `dotenvy`, every field has a documented default, and
//! parse failures are wrapped with `anyhow::Context` before being
//! converted into a `ConfigurationError`.

use crate::errors::ConfigurationError;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Bar width, used to validate `CandleSequence` monotonicity.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M15 => Duration::from_secs(15 * 60),
            Timeframe::H1 => Duration::from_secs(60 * 60),
            Timeframe::H4 => Duration::from_secs(4 * 60 * 60),
            Timeframe::D1 => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl FromStr for Timeframe {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(ConfigurationError::Invalid {
                name: "TIMEFRAMES".to_string(),
                value: other.to_string(),
                reason: "expected one of 15m, 1h, 4h, 1d".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(ConfigurationError::Invalid {
                name: "LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected 'json' or 'text'".to_string(),
            }),
        }
    }
}

/// Immutable, process-lifetime configuration. Cloned by value into each
/// component that needs it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rest_base: String,
    pub ws_base: String,
    pub model_dir: String,
    pub seq_len: usize,
    pub warmup: usize,
    pub timeframes: Vec<Timeframe>,
    pub top_n: usize,
    pub fetch_interval_seconds: u64,
    pub thresh_buy: f64,
    pub min_indicator_conf: f64,
    pub backoff_max_retries: u32,
    pub backoff_jitter: f64,
    pub enable_scheduler: bool,
    pub log_level: String,
    pub log_format: LogFormat,
    pub data_cache_dir: Option<String>,
    pub scheduler_concurrency: usize,
}

impl Settings {
    /// Loads settings once at process start. Non-fatal if `.env` is absent;
    /// fatal (`ConfigurationError`) on malformed values.
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("no .env file found, using process environment only");
        }

        let rest_base = env::var("REST_BASE")
            .unwrap_or_else(|_| "https://api.binance.com".to_string());
        let ws_base =
            env::var("WS_BASE").unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string());
        let model_dir = env::var("MODEL_DIR").unwrap_or_else(|_| "./model".to_string());

        let seq_len = parse_env("SEQ_LEN", "128")?;
        let warmup = parse_env("WARMUP", "200")?;

        let timeframes_str =
            env::var("TIMEFRAMES").unwrap_or_else(|_| "15m,1h,4h,1d".to_string());
        let timeframes: Vec<Timeframe> = timeframes_str
            .split(',')
            .map(|s| Timeframe::from_str(s.trim()))
            .collect::<Result<_, _>>()
            .context("failed to parse TIMEFRAMES")?;
        if timeframes.is_empty() {
            return Err(ConfigurationError::Invalid {
                name: "TIMEFRAMES".to_string(),
                value: timeframes_str,
                reason: "must name at least one timeframe".to_string(),
            }
            .into());
        }

        let top_n: usize = parse_env("TOP_N", "100")?;
        let fetch_interval_seconds: u64 = parse_env("FETCH_INTERVAL_SECONDS", "60")?;
        let thresh_buy: f64 = parse_env("THRESH_BUY", "0.60")?;
        let min_indicator_conf: f64 = parse_env("MIN_INDICATOR_CONF", "3")?;
        let backoff_max_retries: u32 = parse_env("BACKOFF_MAX_RETRIES", "5")?;
        let backoff_jitter: f64 = parse_env("BACKOFF_JITTER", "0.3")?;

        let enable_scheduler = env::var("ENABLE_SCHEDULER")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format_str = env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
        let log_format = LogFormat::from_str(&log_format_str)?;

        let data_cache_dir = env::var("DATA_CACHE_DIR").ok();

        let scheduler_concurrency: usize = parse_env("SCHEDULER_CONCURRENCY", "10")?;

        Ok(Settings {
            rest_base,
            ws_base,
            model_dir,
            seq_len,
            warmup,
            timeframes,
            top_n,
            fetch_interval_seconds,
            thresh_buy,
            min_indicator_conf,
            backoff_max_retries,
            backoff_jitter,
            enable_scheduler,
            log_level,
            log_format,
            data_cache_dir,
            scheduler_concurrency,
        })
    }
}

fn parse_env<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>().map_err(|e| {
        ConfigurationError::Invalid {
            name: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_round_trips_through_str() {
        for tf in [Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1] {
            assert_eq!(Timeframe::from_str(tf.as_str()).unwrap(), tf);
        }
    }

    #[test]
    fn rejects_unknown_timeframe() {
        assert!(Timeframe::from_str("3m").is_err());
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(LogFormat::from_str("xml").is_err());
    }
}
