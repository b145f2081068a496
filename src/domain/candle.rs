//! Candle and CandleSequence: the OHLCV data model.

use crate::settings::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar. Immutable once constructed; `Candle::new` enforces
/// the domain invariant `low <= open, close <= high` and `volume >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, String> {
        if low > open || low > close || low > high {
            return Err(format!(
                "candle invariant violated: low={low} must be <= open={open}, close={close}, high={high}"
            ));
        }
        if open > high || close > high {
            return Err(format!(
                "candle invariant violated: high={high} must be >= open={open}, close={close}"
            ));
        }
        if volume < 0.0 {
            return Err(format!("candle invariant violated: volume={volume} < 0"));
        }
        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// An ordered sequence of Candles for one (symbol, timeframe), strictly
/// monotonic in timestamp with a constant step equal to the timeframe.
#[derive(Debug, Clone)]
pub struct CandleSequence {
    pub symbol: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSequence {
    /// Constructs a sequence, rejecting non-monotonic or irregularly spaced
    /// input. An empty sequence is valid (nothing to evaluate yet).
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<Self, String> {
        let step = timeframe.duration();
        for pair in candles.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let gap = next.timestamp - prev.timestamp;
            let gap_std = chrono::Duration::from_std(step)
                .map_err(|e| format!("invalid timeframe duration: {e}"))?;
            if gap != gap_std {
                return Err(format!(
                    "non-monotonic or irregular step between {} and {}: expected {:?}, got {:?}",
                    prev.timestamp, next.timestamp, gap_std, gap
                ));
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            timeframe,
            candles,
        })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// The most recent `n` candles in chronological order, or the whole
    /// sequence if it is shorter than `n`.
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minute * 900, 0).unwrap()
    }

    #[test]
    fn candle_rejects_low_above_open() {
        let err = Candle::new(ts(0), 10.0, 12.0, 11.0, 10.5, 1.0).unwrap_err();
        assert!(err.contains("low"));
    }

    #[test]
    fn candle_rejects_negative_volume() {
        let err = Candle::new(ts(0), 10.0, 12.0, 9.0, 10.5, -1.0).unwrap_err();
        assert!(err.contains("volume"));
    }

    #[test]
    fn candle_accepts_flat_bar() {
        let c = Candle::new(ts(0), 10.0, 10.0, 10.0, 10.0, 0.0).unwrap();
        assert_eq!(c.typical_price(), 10.0);
    }

    #[test]
    fn sequence_rejects_irregular_step() {
        let candles = vec![
            Candle::new(ts(0), 1.0, 1.0, 1.0, 1.0, 1.0).unwrap(),
            Candle::new(ts(2), 1.0, 1.0, 1.0, 1.0, 1.0).unwrap(),
        ];
        assert!(CandleSequence::new("BTCUSDT", Timeframe::M15, candles).is_err());
    }

    #[test]
    fn sequence_accepts_regular_step_and_tails() {
        let candles = vec![
            Candle::new(ts(0), 1.0, 1.0, 1.0, 1.0, 1.0).unwrap(),
            Candle::new(ts(1), 1.0, 1.0, 1.0, 1.0, 1.0).unwrap(),
            Candle::new(ts(2), 1.0, 1.0, 1.0, 1.0, 1.0).unwrap(),
        ];
        let seq = CandleSequence::new("BTCUSDT", Timeframe::M15, candles).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.tail(2).len(), 2);
        assert_eq!(seq.tail(10).len(), 3);
    }
}
