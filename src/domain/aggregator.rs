//! Real-time trade aggregator: folds a stream of trade ticks into closed
//! OHLCV candles at an arbitrary sub-minute interval, as a pure
//! `process_trade(&mut self, Trade) -> Option<Candle>` method with no
//! repository or broadcast side effect — just the bucket-close contract
//! itself.

use crate::domain::candle::Candle;
use chrono::{DateTime, TimeZone, Utc};

/// One inbound trade tick (aggTrade stream fields `T`, `p`, `q`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    pub time_ms: i64,
    pub price: f64,
    pub quantity: f64,
}

struct InProgressCandle {
    bucket_start_ms: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl InProgressCandle {
    fn new(bucket_start_ms: i64, trade: Trade) -> Self {
        Self {
            bucket_start_ms,
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.quantity,
        }
    }

    fn update(&mut self, trade: Trade) {
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.close = trade.price;
        self.volume += trade.quantity;
    }

    fn to_candle(&self, timeframe: chrono::Duration) -> Option<Candle> {
        let _ = timeframe;
        let timestamp = bucket_start_to_datetime(self.bucket_start_ms)?;
        Candle::new(timestamp, self.open, self.high, self.low, self.close, self.volume).ok()
    }
}

fn bucket_start_to_datetime(bucket_start_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(bucket_start_ms).single()
}

/// Folds a trade stream for one `(symbol, interval_seconds)` pair into
/// closed candles. A candle is emitted exactly once, the instant its
/// bucket rolls over.
pub struct TradeAggregator {
    symbol: String,
    interval_ms: i64,
    current: Option<InProgressCandle>,
}

impl TradeAggregator {
    pub fn new(symbol: impl Into<String>, interval_seconds: u64) -> Self {
        Self {
            symbol: symbol.into(),
            interval_ms: (interval_seconds as i64).max(1) * 1000,
            current: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Folds one trade into the running candle. Returns `Some(candle)` the
    /// instant a bucket closes (i.e. this trade belongs to a later bucket
    /// than the one in progress); otherwise `None`.
    ///
    /// Malformed trades (non-finite price/quantity, negative quantity) are
    /// silently dropped; callers that need to log the drop should validate
    /// before calling.
    pub fn process_trade(&mut self, trade: Trade) -> Option<Candle> {
        if !trade.price.is_finite() || !trade.quantity.is_finite() || trade.quantity < 0.0 {
            return None;
        }

        let bucket_start_ms = trade.time_ms.div_euclid(self.interval_ms) * self.interval_ms;

        match &mut self.current {
            None => {
                self.current = Some(InProgressCandle::new(bucket_start_ms, trade));
                None
            }
            Some(candle) if bucket_start_ms > candle.bucket_start_ms => {
                let timeframe = chrono::Duration::milliseconds(self.interval_ms);
                let closed = candle.to_candle(timeframe);
                self.current = Some(InProgressCandle::new(bucket_start_ms, trade));
                closed
            }
            Some(candle) => {
                candle.update(trade);
                None
            }
        }
    }

    /// The in-progress (not yet closed) candle, if any trade has been seen.
    pub fn in_progress(&self) -> Option<Candle> {
        self.current
            .as_ref()
            .and_then(|c| c.to_candle(chrono::Duration::milliseconds(self.interval_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(time_ms: i64, price: f64, quantity: f64) -> Trade {
        Trade {
            time_ms,
            price,
            quantity,
        }
    }

    #[test]
    fn first_trade_opens_a_candle_without_emitting() {
        let mut agg = TradeAggregator::new("BTCUSDT", 5);
        assert!(agg.process_trade(trade(0, 100.0, 1.0)).is_none());
        let in_progress = agg.in_progress().unwrap();
        assert_eq!(in_progress.open, 100.0);
        assert_eq!(in_progress.volume, 1.0);
    }

    #[test]
    fn trades_within_the_same_bucket_update_without_emitting() {
        let mut agg = TradeAggregator::new("BTCUSDT", 5);
        agg.process_trade(trade(0, 100.0, 1.0));
        assert!(agg.process_trade(trade(2_000, 105.0, 2.0)).is_none());
        assert!(agg.process_trade(trade(4_999, 95.0, 0.5)).is_none());
        let c = agg.in_progress().unwrap();
        assert_eq!(c.high, 105.0);
        assert_eq!(c.low, 95.0);
        assert_eq!(c.close, 95.0);
        assert_eq!(c.volume, 3.5);
    }

    #[test]
    fn rollover_emits_exactly_one_closed_candle() {
        let mut agg = TradeAggregator::new("BTCUSDT", 5);
        agg.process_trade(trade(0, 100.0, 1.0));
        agg.process_trade(trade(3_000, 110.0, 1.0));
        let closed = agg.process_trade(trade(5_000, 120.0, 1.0)).unwrap();
        assert_eq!(closed.open, 100.0);
        assert_eq!(closed.high, 110.0);
        assert_eq!(closed.close, 110.0);
        assert_eq!(closed.volume, 2.0);

        let in_progress = agg.in_progress().unwrap();
        assert_eq!(in_progress.open, 120.0);
    }

    #[test]
    fn candle_invariants_hold_after_every_trade() {
        let mut agg = TradeAggregator::new("ETHUSDT", 1);
        let prices = [10.0, 12.0, 9.0, 11.0, 15.0, 8.0];
        for (i, &p) in prices.iter().enumerate() {
            agg.process_trade(trade(i as i64 * 200, p, 1.0));
            let c = agg.in_progress().unwrap();
            assert!(c.low <= c.open.min(c.close));
            assert!(c.high >= c.open.max(c.close));
            assert!(c.volume >= 0.0);
        }
    }

    #[test]
    fn malformed_trade_is_dropped_without_partial_update() {
        let mut agg = TradeAggregator::new("BTCUSDT", 5);
        agg.process_trade(trade(0, 100.0, 1.0));
        assert!(agg.process_trade(trade(1_000, f64::NAN, 1.0)).is_none());
        assert!(agg.process_trade(trade(1_000, 100.0, -1.0)).is_none());
        let c = agg.in_progress().unwrap();
        assert_eq!(c.close, 100.0);
        assert_eq!(c.volume, 1.0);
    }

    #[test]
    fn replaying_the_same_stream_is_idempotent() {
        let trades = vec![
            trade(0, 100.0, 1.0),
            trade(1_000, 102.0, 1.0),
            trade(5_000, 101.0, 2.0),
            trade(9_999, 99.0, 1.0),
            trade(10_000, 103.0, 1.0),
        ];

        let run = || {
            let mut agg = TradeAggregator::new("BTCUSDT", 5);
            let mut closed = Vec::new();
            for t in &trades {
                if let Some(c) = agg.process_trade(*t) {
                    closed.push(c);
                }
            }
            closed
        };

        let a = run();
        let b = run();
        assert_eq!(a.len(), b.len());
        for (ca, cb) in a.iter().zip(b.iter()) {
            assert_eq!(ca.open, cb.open);
            assert_eq!(ca.high, cb.high);
            assert_eq!(ca.low, cb.low);
            assert_eq!(ca.close, cb.close);
            assert_eq!(ca.volume, cb.volume);
            assert_eq!(ca.timestamp, cb.timestamp);
        }
    }
}
