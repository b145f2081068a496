//! Exercises the trade-to-candle pipeline end to end without any network
//! dependency, alongside the networked integration tests.

use nirvana_signal_service::domain::aggregator::{Trade, TradeAggregator};

#[test]
fn a_full_minute_of_trades_closes_exactly_one_candle_per_bucket() {
    let mut aggregator = TradeAggregator::new("BTCUSDT", 15);

    let mut closed = Vec::new();
    let base_ms = 1_700_000_000_000i64;
    for i in 0..60 {
        let trade = Trade {
            time_ms: base_ms + i * 1_000,
            price: 100.0 + (i % 5) as f64,
            quantity: 1.0,
        };
        if let Some(candle) = aggregator.process_trade(trade) {
            closed.push(candle);
        }
    }

    // 60 one-second trades over a 15-second bucket span 4 bucket boundaries,
    // so 3 candles close during the run (the 4th stays in progress).
    assert_eq!(closed.len(), 3);
    for candle in &closed {
        assert!(candle.low <= candle.open);
        assert!(candle.low <= candle.close);
        assert!(candle.high >= candle.open);
        assert!(candle.high >= candle.close);
        assert!(candle.volume > 0.0);
    }
}

#[test]
fn malformed_trades_are_dropped_without_corrupting_the_running_candle() {
    let mut aggregator = TradeAggregator::new("ETHUSDT", 60);

    let good = Trade {
        time_ms: 1_700_000_000_000,
        price: 2000.0,
        quantity: 1.0,
    };
    assert!(aggregator.process_trade(good).is_none());

    let malformed = Trade {
        time_ms: 1_700_000_000_100,
        price: f64::NAN,
        quantity: 1.0,
    };
    assert!(aggregator.process_trade(malformed).is_none());

    let in_progress = aggregator.in_progress().expect("first trade opened a candle");
    assert_eq!(in_progress.close, 2000.0, "malformed trade must not update the running candle");
}
