//! Market data client: a rate-limited, retrying HTTP client for the
//! upstream candle/ticker REST API.
//!
//! The retry policy is hand-rolled rather than delegated to a generic
//! `ExponentialBackoff` middleware: the 429-vs-other-5xx-vs-4xx-vs-timeout
//! branching has distinct outcomes per status, so a library that retries
//! every transient status indiscriminately would blur that distinction.

use crate::domain::candle::{Candle, CandleSequence};
use crate::errors::MarketDataError;
use crate::settings::Timeframe;
use chrono::{TimeZone, Utc};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info_span, warn, Instrument};

/// 24h ticker statistics for one symbol, parsed from `GET /ticker/24hr`.
#[derive(Debug, Clone, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    #[serde(rename = "quoteVolume")]
    pub quote_volume: String,
}

impl Ticker24h {
    pub fn quote_volume_f64(&self) -> f64 {
        self.quote_volume.parse().unwrap_or(0.0)
    }
}

/// Long-lived, rate-limited HTTP client for the upstream market-data
/// provider. One instance is shared across the whole process; its
/// connection pool lifetime equals the process lifetime.
pub struct MarketDataClient {
    client: Client,
    rest_base: String,
    backoff_max_retries: u32,
    backoff_jitter: f64,
}

impl MarketDataClient {
    pub fn new(rest_base: impl Into<String>, backoff_max_retries: u32, backoff_jitter: f64) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(16)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            rest_base: rest_base.into(),
            backoff_max_retries,
            backoff_jitter,
        }
    }

    /// `GET /api/v3/klines` — up to `min(limit, 1000)` candles, ascending by
    /// timestamp.
    pub async fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<CandleSequence, MarketDataError> {
        let span = info_span!("market_data.get_klines", symbol, interval = timeframe.as_str());
        async {
            let url = format!("{}/api/v3/klines", self.rest_base);
            let limit = limit.min(1000);
            let query = [
                ("symbol", symbol.to_string()),
                ("interval", timeframe.as_str().to_string()),
                ("limit", limit.to_string()),
            ];

            let body = self.request_with_backoff(&url, &query).await?;
            let raw = body.as_array().ok_or_else(|| MarketDataError::UpstreamClient {
                status: 0,
                body: "klines response is not a JSON array".to_string(),
            })?;

            let mut candles = Vec::with_capacity(raw.len());
            for entry in raw {
                if let Some(candle) = parse_kline(entry) {
                    candles.push(candle);
                } else {
                    warn!("skipping malformed kline entry for {symbol}");
                }
            }

            CandleSequence::new(symbol, timeframe, candles).map_err(|reason| {
                MarketDataError::UpstreamClient {
                    status: 0,
                    body: format!("upstream returned inconsistent candle sequence: {reason}"),
                }
            })
        }
        .instrument(span)
        .await
    }

    /// `GET /api/v3/ticker/24hr` for every symbol.
    pub async fn get_24h_tickers(&self) -> Result<Vec<Ticker24h>, MarketDataError> {
        let span = info_span!("market_data.get_24h_tickers");
        async {
            let url = format!("{}/api/v3/ticker/24hr", self.rest_base);
            let body = self.request_with_backoff(&url, &[]).await?;
            serde_json::from_value(body).map_err(|e| MarketDataError::UpstreamClient {
                status: 0,
                body: format!("failed to parse 24h ticker response: {e}"),
            })
        }
        .instrument(span)
        .await
    }

    /// `GET /api/v3/ticker/24hr?symbol=...` for one symbol.
    pub async fn get_24h_ticker(&self, symbol: &str) -> Result<Ticker24h, MarketDataError> {
        let span = info_span!("market_data.get_24h_ticker", symbol);
        async {
            let url = format!("{}/api/v3/ticker/24hr", self.rest_base);
            let body = self
                .request_with_backoff(&url, &[("symbol", symbol.to_string())])
                .await?;
            serde_json::from_value(body).map_err(|e| MarketDataError::UpstreamClient {
                status: 0,
                body: format!("failed to parse 24h ticker response: {e}"),
            })
        }
        .instrument(span)
        .await
    }

    /// Scoped release of the underlying connection pool. Idempotent: the
    /// pool is drained best-effort; subsequent calls are harmless no-ops
    /// since `reqwest::Client` has no observable "closed" state.
    pub async fn close(&self) {
        // `reqwest::Client` has no explicit close handle; dropping the last
        // clone releases the pool. This method exists so callers have a
        // single, explicit shutdown point even though the underlying
        // resource release is implicit.
    }

    /// Exponential backoff with jitter: 429 and timeouts retry with
    /// `2^attempt * (1 + jitter)` seconds, other 5xx with `2^attempt`
    /// seconds, up to `backoff_max_retries`. Other 4xx fail immediately;
    /// exhausted retries raise `UpstreamUnavailable`.
    async fn request_with_backoff(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, MarketDataError> {
        let mut last_status: Option<u16> = None;
        let mut last_reason = String::new();

        for attempt in 0..self.backoff_max_retries {
            let result = self.client.get(url).query(query).send().await;

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    last_reason = e.to_string();
                    if e.is_timeout() {
                        last_status = None;
                        self.sleep_backoff(attempt, true).await;
                        continue;
                    }
                    self.sleep_backoff(attempt, false).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<Value>().await.map_err(|e| {
                    MarketDataError::UpstreamClient {
                        status: status.as_u16(),
                        body: format!("failed to parse response body: {e}"),
                    }
                });
            }

            last_status = Some(status.as_u16());
            last_reason = response.text().await.unwrap_or_default();

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.sleep_backoff(attempt, true).await;
                continue;
            }
            if status.is_server_error() {
                self.sleep_backoff(attempt, false).await;
                continue;
            }
            // Any other 4xx is non-retryable.
            return Err(MarketDataError::UpstreamClient {
                status: status.as_u16(),
                body: last_reason,
            });
        }

        Err(MarketDataError::UpstreamUnavailable {
            attempts: self.backoff_max_retries,
            last_status,
            reason: last_reason,
        })
    }

    async fn sleep_backoff(&self, attempt: u32, jittered: bool) {
        let base = 2f64.powi(attempt as i32);
        let wait_secs = if jittered {
            base * (1.0 + self.backoff_jitter)
        } else {
            base
        };
        tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
    }
}

fn parse_kline(entry: &Value) -> Option<Candle> {
    let arr = entry.as_array()?;
    if arr.len() < 6 {
        return None;
    }
    let open_time_ms = arr[0].as_i64()?;
    let timestamp = Utc.timestamp_millis_opt(open_time_ms).single()?;
    let open = parse_numeric(&arr[1])?;
    let high = parse_numeric(&arr[2])?;
    let low = parse_numeric(&arr[3])?;
    let close = parse_numeric(&arr[4])?;
    let volume = parse_numeric(&arr[5])?;
    Candle::new(timestamp, open, high, low, close, volume).ok()
}

fn parse_numeric(value: &Value) -> Option<f64> {
    if let Some(s) = value.as_str() {
        s.parse().ok()
    } else {
        value.as_f64()
    }
}

/// Draws a jitter fraction in `[0, jitter]`, used by callers that want to
/// spread concurrent retries instead of applying the same wait uniformly,
/// avoiding a thundering herd when many symbols are rate-limited at once.
pub fn random_jitter(jitter: f64) -> f64 {
    if jitter <= 0.0 {
        return 0.0;
    }
    rand::rng().random_range(0.0..=jitter)
}
