//! Hand-rolled pure indicator functions for columns the `ta` crate has no
//! primitive for: stochastic-RSI, VWAP, OBV, historical volatility,
//! price-change percentages, and candle-shape ratios. These are naturally
//! whole-sequence windowed aggregations, implemented as pure functions over
//! slices rather than the bar-by-bar streaming state used for the
//! `ta`-crate-backed columns in `builder.rs`.

use crate::domain::candle::Candle;
use std::collections::VecDeque;

/// Stochastic-of-RSI, "14-3-3": raw stochastic of the RSI series over
/// `stoch_period` bars, then `%K` and `%D` each smoothed by a
/// `smooth`-period simple moving average.
pub fn stoch_rsi(rsi: &[f64], stoch_period: usize, smooth: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rsi.len();
    let mut raw = vec![0.0; n];
    let mut window: VecDeque<f64> = VecDeque::with_capacity(stoch_period);
    for i in 0..n {
        window.push_back(rsi[i]);
        if window.len() > stoch_period {
            window.pop_front();
        }
        let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        raw[i] = if (hi - lo).abs() > f64::EPSILON {
            (rsi[i] - lo) / (hi - lo) * 100.0
        } else {
            0.0
        };
    }
    let k = simple_moving_average(&raw, smooth);
    let d = simple_moving_average(&k, smooth);
    (k, d)
}

/// Plain trailing simple moving average over whatever history is
/// available (no NaN padding before the window fills).
pub fn simple_moving_average(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut window: VecDeque<f64> = VecDeque::with_capacity(period);
    let mut sum = 0.0;
    for &v in values {
        window.push_back(v);
        sum += v;
        if window.len() > period {
            sum -= window.pop_front().unwrap();
        }
        out.push(sum / window.len() as f64);
    }
    out
}

/// Cumulative VWAP: `Σ(typical · volume) / Σ(volume)` from the start of
/// the supplied history.
pub fn cumulative_vwap(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut cum_tpv = 0.0;
    let mut cum_vol = 0.0;
    for c in candles {
        cum_tpv += c.typical_price() * c.volume;
        cum_vol += c.volume;
        out.push(if cum_vol > 0.0 { cum_tpv / cum_vol } else { 0.0 });
    }
    out
}

/// On-Balance Volume: cumulative `sign(Δclose) · volume`. The first bar
/// has no predecessor, so it contributes zero.
pub fn on_balance_volume(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut obv = 0.0;
    for (i, c) in candles.iter().enumerate() {
        if i > 0 {
            let prev_close = candles[i - 1].close;
            if c.close > prev_close {
                obv += c.volume;
            } else if c.close < prev_close {
                obv -= c.volume;
            }
        }
        out.push(obv);
    }
    out
}

/// `close_t / close_{t-lag} - 1`, undefined (0.0) for the first `lag` bars.
pub fn price_change(closes: &[f64], lag: usize) -> Vec<f64> {
    let mut out = vec![0.0; closes.len()];
    for i in lag..closes.len() {
        let prior = closes[i - lag];
        out[i] = if prior != 0.0 {
            (closes[i] - prior) / prior
        } else {
            0.0
        };
    }
    out
}

/// Rolling sample standard deviation (ddof=1, matching pandas' default) of
/// `log(close_t / close_{t-1})` over `window` bars.
pub fn rolling_log_return_std(closes: &[f64], window: usize) -> Vec<f64> {
    let n = closes.len();
    let mut log_returns = vec![0.0; n];
    for i in 1..n {
        if closes[i - 1] > 0.0 && closes[i] > 0.0 {
            log_returns[i] = (closes[i] / closes[i - 1]).ln();
        }
    }

    let mut out = vec![0.0; n];
    let mut buf: VecDeque<f64> = VecDeque::with_capacity(window);
    for i in 0..n {
        buf.push_back(log_returns[i]);
        if buf.len() > window {
            buf.pop_front();
        }
        out[i] = if buf.len() > 1 {
            sample_std(buf.iter().copied())
        } else {
            0.0
        };
    }
    out
}

fn sample_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count() as f64;
    let mean = values.clone().sum::<f64>() / n;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Candle-shape ratios: `(body_size, upper_shadow, lower_shadow)`, each
/// normalized by the open.
pub fn candle_shape(c: &Candle) -> (f64, f64, f64) {
    if c.open == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let body_size = (c.close - c.open).abs() / c.open;
    let upper_shadow = (c.high - c.open.max(c.close)) / c.open;
    let lower_shadow = (c.open.min(c.close) - c.low) / c.open;
    (body_size, upper_shadow, lower_shadow)
}

/// Three-step NaN/Inf hygiene pass: replace ±∞ with NaN, forward-fill,
/// back-fill, then zero anything still missing. Order matters — skipping
/// the forward fill corrupts recent indicator values at warmup boundaries.
pub fn sanitize_column(values: &mut [f64]) {
    for v in values.iter_mut() {
        if v.is_infinite() {
            *v = f64::NAN;
        }
    }

    let mut last_valid: Option<f64> = None;
    for v in values.iter_mut() {
        if v.is_nan() {
            if let Some(prev) = last_valid {
                *v = prev;
            }
        } else {
            last_valid = Some(*v);
        }
    }

    let mut next_valid: Option<f64> = None;
    for v in values.iter_mut().rev() {
        if v.is_nan() {
            if let Some(next) = next_valid {
                *v = next;
            }
        } else {
            next_valid = Some(*v);
        }
    }

    for v in values.iter_mut() {
        if v.is_nan() {
            *v = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_forward_fills_then_back_fills_then_zeroes() {
        let mut col = vec![f64::NAN, 1.0, f64::NAN, f64::INFINITY, 2.0, f64::NAN];
        sanitize_column(&mut col);
        assert_eq!(col, vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn sanitize_all_nan_column_becomes_zero() {
        let mut col = vec![f64::NAN, f64::NAN];
        sanitize_column(&mut col);
        assert_eq!(col, vec![0.0, 0.0]);
    }

    #[test]
    fn price_change_is_zero_before_lag_elapses() {
        let closes = vec![100.0, 110.0, 121.0];
        let pc = price_change(&closes, 1);
        assert_eq!(pc[0], 0.0);
        assert!((pc[1] - 0.10).abs() < 1e-9);
        assert!((pc[2] - 0.10).abs() < 1e-9);
    }

    #[test]
    fn obv_accumulates_signed_volume() {
        let mk = |close: f64| Candle::new(chrono::Utc::now(), close, close, close, close, 10.0).unwrap();
        let candles = vec![mk(100.0), mk(105.0), mk(102.0)];
        let obv = on_balance_volume(&candles);
        assert_eq!(obv, vec![0.0, 10.0, 0.0]);
    }

    #[test]
    fn stoch_rsi_is_bounded_zero_to_hundred() {
        let rsi: Vec<f64> = (0..50).map(|i| 30.0 + (i as f64 * 1.3).sin() * 20.0).collect();
        let (k, d) = stoch_rsi(&rsi, 14, 3);
        for v in k.iter().chain(d.iter()) {
            assert!(*v >= -1e-9 && *v <= 100.0 + 1e-9);
        }
    }
}
