//! The feature column contract. Order is normative: any two runs must
//! produce identical column ordering so the normalizer parameters align.

/// Names of the indicator columns fed to the normalizer and the model, in
/// the exact order `FeatureRow::to_vector` emits them. Excludes `timestamp`
/// (and the training-only `symbol`/`label` columns, which never reach this
/// crate).
pub const FEATURE_COLUMNS: &[&str] = &[
    "open",
    "high",
    "low",
    "close",
    "volume",
    "rsi",
    "rsi_6",
    "stoch_k",
    "stoch_d",
    "macd",
    "macd_signal",
    "macd_histogram",
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "bb_width",
    "bb_position",
    "ema_9",
    "ema_12",
    "ema_26",
    "ema_50",
    "ema_200",
    "sma_20",
    "sma_50",
    "sma_200",
    "atr",
    "hv_20",
    "vwap",
    "obv",
    "volume_ratio",
    "price_change_1",
    "price_change_5",
    "price_change_10",
    "body_size",
    "upper_shadow",
    "lower_shadow",
];

/// One row produced by the feature builder from a `CandleSequence`. Field
/// declaration order matches `FEATURE_COLUMNS` (after the leading
/// `timestamp`), which `to_vector` relies on.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct FeatureRow {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub rsi: f64,
    pub rsi_6: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub bb_width: f64,
    pub bb_position: f64,
    pub ema_9: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    pub ema_50: f64,
    pub ema_200: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub sma_200: f64,
    pub atr: f64,
    pub hv_20: f64,
    pub vwap: f64,
    pub obv: f64,
    pub volume_ratio: f64,
    pub price_change_1: f64,
    pub price_change_5: f64,
    pub price_change_10: f64,
    pub body_size: f64,
    pub upper_shadow: f64,
    pub lower_shadow: f64,
}

impl FeatureRow {
    /// The indicator columns as a `FEATURE_COLUMNS`-ordered vector, ready
    /// for the normalizer and the model's `(1, seq_len, n_features)` input
    /// tensor.
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.rsi,
            self.rsi_6,
            self.stoch_k,
            self.stoch_d,
            self.macd,
            self.macd_signal,
            self.macd_histogram,
            self.bb_upper,
            self.bb_middle,
            self.bb_lower,
            self.bb_width,
            self.bb_position,
            self.ema_9,
            self.ema_12,
            self.ema_26,
            self.ema_50,
            self.ema_200,
            self.sma_20,
            self.sma_50,
            self.sma_200,
            self.atr,
            self.hv_20,
            self.vwap,
            self.obv,
            self.volume_ratio,
            self.price_change_1,
            self.price_change_5,
            self.price_change_10,
            self.body_size,
            self.upper_shadow,
            self.lower_shadow,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_vector_length_matches_column_contract() {
        let row = FeatureRow {
            timestamp: chrono::Utc::now(),
            open: 0.0,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            volume: 0.0,
            rsi: 0.0,
            rsi_6: 0.0,
            stoch_k: 0.0,
            stoch_d: 0.0,
            macd: 0.0,
            macd_signal: 0.0,
            macd_histogram: 0.0,
            bb_upper: 0.0,
            bb_middle: 0.0,
            bb_lower: 0.0,
            bb_width: 0.0,
            bb_position: 0.0,
            ema_9: 0.0,
            ema_12: 0.0,
            ema_26: 0.0,
            ema_50: 0.0,
            ema_200: 0.0,
            sma_20: 0.0,
            sma_50: 0.0,
            sma_200: 0.0,
            atr: 0.0,
            hv_20: 0.0,
            vwap: 0.0,
            obv: 0.0,
            volume_ratio: 0.0,
            price_change_1: 0.0,
            price_change_5: 0.0,
            price_change_10: 0.0,
            body_size: 0.0,
            upper_shadow: 0.0,
            lower_shadow: 0.0,
        };
        assert_eq!(row.to_vector().len(), FEATURE_COLUMNS.len());
    }
}
