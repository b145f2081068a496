//! Feature builder: a pure, deterministic transform from a candle history
//! into a `FeatureRow` stream.
//!
//! Indicators the `ta` crate provides are driven bar-by-bar: fresh
//! indicator instances are folded over the candle history on every call,
//! which is what makes the function pure (same input yields the same
//! output) despite the streaming internals. Indicators without a `ta`
//! primitive are computed in `indicators.rs`.

use super::columns::FeatureRow;
use super::indicators;
use crate::domain::candle::Candle;
use ta::Next;
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::DataItem;

const RSI_PERIOD: usize = 14;
const RSI_FAST_PERIOD: usize = 6;
const STOCH_PERIOD: usize = 14;
const STOCH_SMOOTH: usize = 3;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const ATR_PERIOD: usize = 14;
const HV_WINDOW: usize = 20;
const HV_ANNUALIZATION: f64 = 252.0;
const VOLUME_SMA_PERIOD: usize = 20;

/// Builds the full, ordered feature frame for a candle history. Never
/// performs I/O; same input always yields the same output (modulo the
/// underlying floating point library's own determinism).
pub fn build_features(candles: &[Candle]) -> Vec<FeatureRow> {
    let n = candles.len();
    if n == 0 {
        return Vec::new();
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).expect("valid RSI period");
    let mut rsi_6 = RelativeStrengthIndex::new(RSI_FAST_PERIOD).expect("valid RSI period");
    let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
        .expect("valid MACD periods");
    let mut bb = BollingerBands::new(BB_PERIOD, BB_STD_DEV).expect("valid BB period");
    let mut atr = AverageTrueRange::new(ATR_PERIOD).expect("valid ATR period");
    let mut ema_9 = ExponentialMovingAverage::new(9).expect("valid EMA period");
    let mut ema_12 = ExponentialMovingAverage::new(12).expect("valid EMA period");
    let mut ema_26 = ExponentialMovingAverage::new(26).expect("valid EMA period");
    let mut ema_50 = ExponentialMovingAverage::new(50).expect("valid EMA period");
    let mut ema_200 = ExponentialMovingAverage::new(200).expect("valid EMA period");
    let mut sma_20 = SimpleMovingAverage::new(20).expect("valid SMA period");
    let mut sma_50 = SimpleMovingAverage::new(50).expect("valid SMA period");
    let mut sma_200 = SimpleMovingAverage::new(200).expect("valid SMA period");
    let mut volume_sma_20 = SimpleMovingAverage::new(VOLUME_SMA_PERIOD).expect("valid SMA period");

    let mut col_rsi = vec![0.0; n];
    let mut col_rsi_6 = vec![0.0; n];
    let mut col_macd = vec![0.0; n];
    let mut col_macd_signal = vec![0.0; n];
    let mut col_macd_hist = vec![0.0; n];
    let mut col_bb_upper = vec![0.0; n];
    let mut col_bb_middle = vec![0.0; n];
    let mut col_bb_lower = vec![0.0; n];
    let mut col_atr = vec![0.0; n];
    let mut col_ema_9 = vec![0.0; n];
    let mut col_ema_12 = vec![0.0; n];
    let mut col_ema_26 = vec![0.0; n];
    let mut col_ema_50 = vec![0.0; n];
    let mut col_ema_200 = vec![0.0; n];
    let mut col_sma_20 = vec![0.0; n];
    let mut col_sma_50 = vec![0.0; n];
    let mut col_sma_200 = vec![0.0; n];
    let mut col_volume_sma_20 = vec![0.0; n];

    for (i, c) in candles.iter().enumerate() {
        let price = c.close;
        col_rsi[i] = rsi.next(price);
        col_rsi_6[i] = rsi_6.next(price);
        let macd_out = macd.next(price);
        col_macd[i] = macd_out.macd;
        col_macd_signal[i] = macd_out.signal;
        col_macd_hist[i] = macd_out.histogram;
        let bb_out = bb.next(price);
        col_bb_upper[i] = bb_out.upper;
        col_bb_middle[i] = bb_out.average;
        col_bb_lower[i] = bb_out.lower;

        // ATR needs the real high/low, not just close, or true range
        // collapses to |close - prev_close|.
        let bar = DataItem::builder()
            .open(c.open)
            .high(c.high)
            .low(c.low)
            .close(c.close)
            .volume(c.volume)
            .build()
            .expect("candle invariants guarantee a valid bar");
        col_atr[i] = atr.next(&bar);

        col_ema_9[i] = ema_9.next(price);
        col_ema_12[i] = ema_12.next(price);
        col_ema_26[i] = ema_26.next(price);
        col_ema_50[i] = ema_50.next(price);
        col_ema_200[i] = ema_200.next(price);
        col_sma_20[i] = sma_20.next(price);
        col_sma_50[i] = sma_50.next(price);
        col_sma_200[i] = sma_200.next(price);
        col_volume_sma_20[i] = volume_sma_20.next(c.volume);
    }

    let (mut col_stoch_k, mut col_stoch_d) = indicators::stoch_rsi(&col_rsi, STOCH_PERIOD, STOCH_SMOOTH);

    let mut col_bb_width: Vec<f64> = (0..n)
        .map(|i| (col_bb_upper[i] - col_bb_lower[i]) / col_bb_middle[i])
        .collect();
    let mut col_bb_position: Vec<f64> = (0..n)
        .map(|i| (candles[i].close - col_bb_lower[i]) / (col_bb_upper[i] - col_bb_lower[i]))
        .collect();

    let mut col_hv_20: Vec<f64> = indicators::rolling_log_return_std(&closes, HV_WINDOW)
        .into_iter()
        .map(|std| std * HV_ANNUALIZATION.sqrt())
        .collect();

    let mut col_vwap = indicators::cumulative_vwap(candles);
    let mut col_obv = indicators::on_balance_volume(candles);
    // Clamp to 0.0 on a zero 20-period volume mean rather than propagating
    // a division-by-zero Inf (see DESIGN.md).
    let mut col_volume_ratio: Vec<f64> = (0..n)
        .map(|i| {
            if col_volume_sma_20[i] > 0.0 {
                candles[i].volume / col_volume_sma_20[i]
            } else {
                0.0
            }
        })
        .collect();

    let mut col_price_change_1 = indicators::price_change(&closes, 1);
    let mut col_price_change_5 = indicators::price_change(&closes, 5);
    let mut col_price_change_10 = indicators::price_change(&closes, 10);

    let mut col_body_size = vec![0.0; n];
    let mut col_upper_shadow = vec![0.0; n];
    let mut col_lower_shadow = vec![0.0; n];
    for (i, c) in candles.iter().enumerate() {
        let (body, upper, lower) = indicators::candle_shape(c);
        col_body_size[i] = body;
        col_upper_shadow[i] = upper;
        col_lower_shadow[i] = lower;
    }

    for col in [
        &mut col_rsi,
        &mut col_rsi_6,
        &mut col_stoch_k,
        &mut col_stoch_d,
        &mut col_macd,
        &mut col_macd_signal,
        &mut col_macd_hist,
        &mut col_bb_upper,
        &mut col_bb_middle,
        &mut col_bb_lower,
        &mut col_bb_width,
        &mut col_bb_position,
        &mut col_ema_9,
        &mut col_ema_12,
        &mut col_ema_26,
        &mut col_ema_50,
        &mut col_ema_200,
        &mut col_sma_20,
        &mut col_sma_50,
        &mut col_sma_200,
        &mut col_atr,
        &mut col_hv_20,
        &mut col_vwap,
        &mut col_obv,
        &mut col_volume_ratio,
        &mut col_price_change_1,
        &mut col_price_change_5,
        &mut col_price_change_10,
        &mut col_body_size,
        &mut col_upper_shadow,
        &mut col_lower_shadow,
    ] {
        indicators::sanitize_column(col);
    }

    (0..n)
        .map(|i| FeatureRow {
            timestamp: candles[i].timestamp,
            open: candles[i].open,
            high: candles[i].high,
            low: candles[i].low,
            close: candles[i].close,
            volume: candles[i].volume,
            rsi: col_rsi[i],
            rsi_6: col_rsi_6[i],
            stoch_k: col_stoch_k[i],
            stoch_d: col_stoch_d[i],
            macd: col_macd[i],
            macd_signal: col_macd_signal[i],
            macd_histogram: col_macd_hist[i],
            bb_upper: col_bb_upper[i],
            bb_middle: col_bb_middle[i],
            bb_lower: col_bb_lower[i],
            bb_width: col_bb_width[i],
            bb_position: col_bb_position[i],
            ema_9: col_ema_9[i],
            ema_12: col_ema_12[i],
            ema_26: col_ema_26[i],
            ema_50: col_ema_50[i],
            ema_200: col_ema_200[i],
            sma_20: col_sma_20[i],
            sma_50: col_sma_50[i],
            sma_200: col_sma_200[i],
            atr: col_atr[i],
            hv_20: col_hv_20[i],
            vwap: col_vwap[i],
            obv: col_obv[i],
            volume_ratio: col_volume_ratio[i],
            price_change_1: col_price_change_1[i],
            price_change_5: col_price_change_5[i],
            price_change_10: col_price_change_10[i],
            body_size: col_body_size[i],
            upper_shadow: col_upper_shadow[i],
            lower_shadow: col_lower_shadow[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::columns::FEATURE_COLUMNS;
    use chrono::{DateTime, TimeZone, Utc};

    fn synthetic_candles(n: usize) -> Vec<Candle> {
        let start: DateTime<Utc> = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        (0..n)
            .map(|i| {
                let t = start + chrono::Duration::hours(i as i64);
                let base = 100.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64 * 0.05;
                let open = base;
                let close = base + (i as f64 * 0.21).cos() * 0.5;
                let high = open.max(close) + 0.5;
                let low = open.min(close) - 0.5;
                let volume = 10.0 + (i as f64 * 0.11).sin().abs() * 5.0;
                Candle::new(t, open, high, low, close, volume).unwrap()
            })
            .collect()
    }

    #[test]
    fn determinism_same_input_same_output() {
        let candles = synthetic_candles(260);
        let a = build_features(&candles);
        let b = build_features(&candles);
        for (ra, rb) in a.iter().zip(b.iter()) {
            assert_eq!(ra.to_vector(), rb.to_vector());
        }
    }

    #[test]
    fn no_nan_or_inf_leaks() {
        let candles = synthetic_candles(260);
        let rows = build_features(&candles);
        for row in &rows {
            for v in row.to_vector() {
                assert!(v.is_finite(), "non-finite feature value: {v}");
            }
        }
    }

    #[test]
    fn column_contract_matches_vector_length() {
        let candles = synthetic_candles(260);
        let rows = build_features(&candles);
        for row in &rows {
            assert_eq!(row.to_vector().len(), FEATURE_COLUMNS.len());
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(build_features(&[]).is_empty());
    }
}
