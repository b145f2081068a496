//! A websocket-connected trade feed that drives a single-symbol
//! `TradeAggregator` from the upstream `aggTrade` stream: a
//! reconnect-with-doubling-backoff-capped-at-60s loop over
//! `/stream?streams=...`, emitting closed `Candle`s through a
//! `tokio::sync::mpsc` channel. `TradeAggregator` itself is tested without
//! any network dependency in `domain/aggregator.rs`.

use crate::domain::aggregator::{Trade, TradeAggregator};
use crate::domain::candle::Candle;
use crate::errors::MalformedMessage;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const MAX_BACKOFF_SECS: u64 = 60;

/// Raw `aggTrade` envelope fields consumed here: event type, symbol,
/// trade time, price, quantity.
#[derive(Debug, Deserialize)]
struct AggTradeEnvelope {
    #[serde(rename = "data")]
    data: AggTradePayload,
}

#[derive(Debug, Deserialize)]
struct AggTradePayload {
    #[serde(rename = "e")]
    #[allow(dead_code)]
    event_type: String,
    #[serde(rename = "T")]
    trade_time_ms: i64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
}

/// Drives a single-symbol `TradeAggregator` from a websocket `aggTrade`
/// stream, reconnecting with exponential backoff on any disconnect.
pub struct WsTradeFeed {
    ws_base: String,
    symbol: String,
    interval_seconds: u64,
}

impl WsTradeFeed {
    pub fn new(ws_base: impl Into<String>, symbol: impl Into<String>, interval_seconds: u64) -> Self {
        Self {
            ws_base: ws_base.into(),
            symbol: symbol.into(),
            interval_seconds,
        }
    }

    /// Runs forever, emitting closed candles on `tx`. Exits only when `tx`
    /// is dropped (closed channel) or the task is cancelled by its caller.
    pub async fn run(self, tx: Sender<Candle>) {
        let mut backoff = 1u64;
        loop {
            match self.connect_and_stream(&tx).await {
                Ok(()) => {
                    info!(symbol = %self.symbol, "websocket trade stream closed gracefully");
                    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    backoff = 1;
                }
                Err(e) => {
                    error!(
                        symbol = %self.symbol,
                        "websocket trade stream error: {e}. reconnecting in {backoff}s"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_secs(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                }
            }
            if tx.is_closed() {
                break;
            }
        }
    }

    async fn connect_and_stream(&self, tx: &Sender<Candle>) -> anyhow::Result<()> {
        let stream_name = format!("{}@aggTrade", self.symbol.to_lowercase());
        let url = format!(
            "{}/stream?streams={stream_name}",
            self.ws_base.trim_end_matches('/')
        );

        info!(symbol = %self.symbol, %url, "connecting to trade stream");
        let (ws_stream, _) = connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        let mut aggregator = TradeAggregator::new(self.symbol.clone(), self.interval_seconds);

        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => match parse_agg_trade(&text) {
                    Ok(trade) => {
                        if let Some(candle) = aggregator.process_trade(trade) {
                            if tx.send(candle).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Err(e) => {
                        warn!(symbol = %self.symbol, "{e}");
                    }
                },
                Message::Ping(payload) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_agg_trade(text: &str) -> Result<Trade, MalformedMessage> {
    let envelope: AggTradeEnvelope =
        serde_json::from_str(text).map_err(|e| MalformedMessage::Trade {
            reason: format!("invalid aggTrade envelope: {e}"),
        })?;
    let price = envelope
        .data
        .price
        .parse::<f64>()
        .map_err(|e| MalformedMessage::Trade {
            reason: format!("invalid price {:?}: {e}", envelope.data.price),
        })?;
    let quantity = envelope
        .data
        .quantity
        .parse::<f64>()
        .map_err(|e| MalformedMessage::Trade {
            reason: format!("invalid quantity {:?}: {e}", envelope.data.quantity),
        })?;
    Ok(Trade {
        time_ms: envelope.data.trade_time_ms,
        price,
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_agg_trade_envelope() {
        let text = r#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","E":1700000000123,"s":"BTCUSDT","a":1,"p":"50000.10","q":"0.01","f":1,"l":1,"T":1700000000100,"m":true}}"#;
        let trade = parse_agg_trade(text).unwrap();
        assert_eq!(trade.time_ms, 1_700_000_000_100);
        assert!((trade.price - 50000.10).abs() < 1e-6);
        assert!((trade.quantity - 0.01).abs() < 1e-9);
    }

    #[test]
    fn malformed_envelope_is_dropped() {
        assert!(parse_agg_trade("not json").is_err());
        assert!(parse_agg_trade(r#"{"data":{"e":"aggTrade"}}"#).is_err());
    }
}
