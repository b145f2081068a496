//! Inference engine — owns the model lifecycle and produces Signals. The
//! ONNX session is committed once at construction; a missing or invalid
//! artifact never fails startup — it flips a `degraded` flag and every
//! subsequent `predict` call returns an always-PASS Signal instead.

use crate::domain::candle::Candle;
use crate::domain::signal::{Decision, Signal};
use crate::errors::MarketDataError;
use crate::features::build_features;
use crate::inference::artifact::ModelMetadata;
use crate::inference::normalizer::NormalizerParameters;
use crate::settings::Settings;
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

const UNCERTAINTY_PASSES: usize = 10;
const UNCERTAINTY_THRESHOLD: f64 = 0.15;
const UNCERTAINTY_CONFIDENCE_PENALTY: f64 = 0.85;
const HOLD_VOTE_THRESHOLD: f64 = 2.0;
const HOLD_PROB_FACTOR: f64 = 0.8;

/// (LOADED → degraded if load error → LOADED only via a manual reload).
/// Requests never drive a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Loaded,
    Degraded,
}

pub struct InferenceEngine {
    session: Option<Mutex<Session>>,
    normalizer: NormalizerParameters,
    metadata: Option<ModelMetadata>,
    state: EngineState,
    seq_len: usize,
    thresh_buy: f64,
    min_indicator_conf: f64,
}

impl InferenceEngine {
    /// Loads `saved_model.onnx`, `norm_median.bin`, `norm_scale.bin` and
    /// `metadata.json` from `model_dir`. All four must be present to enter
    /// LOADED state; any failure degrades gracefully.
    pub fn load(model_dir: &Path, settings: &Settings) -> Self {
        let model_path = model_dir.join("saved_model.onnx");
        let median_path = model_dir.join("norm_median.bin");
        let scale_path = model_dir.join("norm_scale.bin");
        let metadata_path = model_dir.join("metadata.json");

        let metadata = std::fs::read_to_string(&metadata_path)
            .ok()
            .and_then(|raw| match ModelMetadata::from_json(&raw) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("failed to parse {}: {e}", metadata_path.display());
                    None
                }
            });

        let n_features = metadata
            .as_ref()
            .map(|m| m.n_features)
            .unwrap_or(crate::features::FEATURE_COLUMNS.len());

        let normalizer = NormalizerParameters::from_files(&median_path, &scale_path)
            .unwrap_or_else(|e| {
                warn!(
                    "normalizer parameters unavailable ({e}); falling back to identity transform"
                );
                NormalizerParameters::identity(n_features)
            });

        let session = if model_path.exists() {
            match Session::builder().and_then(|b| b.commit_from_file(&model_path)) {
                Ok(s) => {
                    info!("loaded ONNX model from {}", model_path.display());
                    Some(Mutex::new(s))
                }
                Err(e) => {
                    error!("failed to load ONNX model {}: {e}", model_path.display());
                    None
                }
            }
        } else {
            warn!("model artifact not found at {}", model_path.display());
            None
        };

        let state = if session.is_some() && metadata.is_some() {
            EngineState::Loaded
        } else {
            EngineState::Degraded
        };

        Self {
            session,
            normalizer,
            metadata,
            state,
            seq_len: settings.seq_len,
            thresh_buy: settings.thresh_buy,
            min_indicator_conf: settings.min_indicator_conf,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.state == EngineState::Degraded
    }

    pub fn model_id(&self) -> String {
        self.metadata
            .as_ref()
            .map(|m| m.model_id.clone())
            .unwrap_or_else(|| "unavailable".to_string())
    }

    /// Training timestamp recorded in `metadata.json`, if the model loaded.
    pub fn trained_at(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.trained_at.as_str())
    }

    /// Builds features, normalizes the last `seq_len` rows, evaluates the
    /// model and applies the decision rule.
    pub fn predict(
        &self,
        candles: &[Candle],
        calculate_uncertainty: bool,
    ) -> Result<Signal, MarketDataError> {
        if self.is_degraded() {
            return Ok(Signal {
                decision: Decision::Pass,
                confidence: 0.0,
                probability: 0.0,
                uncertainty: None,
                model_id: self.model_id(),
                reasoning: vec!["Model not loaded - using mock prediction".to_string()],
            });
        }

        let rows = build_features(candles);
        if rows.len() < self.seq_len {
            return Err(MarketDataError::InsufficientData {
                got: rows.len(),
                need: self.seq_len,
            });
        }

        let window = &rows[rows.len() - self.seq_len..];
        let n_features = self.normalizer.n_features();
        let normalized: Vec<Vec<f64>> = window
            .iter()
            .map(|r| self.normalizer.transform(&r.to_vector()))
            .collect();

        let (prob, uncertainty) = if calculate_uncertainty {
            let mut samples = Vec::with_capacity(UNCERTAINTY_PASSES);
            for _ in 0..UNCERTAINTY_PASSES {
                samples.push(self.run_session(&normalized, n_features)?);
            }
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            let variance = samples.iter().map(|p| (p - mean).powi(2)).sum::<f64>()
                / (samples.len() - 1) as f64;
            (mean, Some(variance.sqrt()))
        } else {
            (self.run_session(&normalized, n_features)?, None)
        };

        let latest = window.last().expect("seq_len > 0 guarantees non-empty window");
        Ok(decide(
            prob,
            latest,
            uncertainty,
            self.thresh_buy,
            self.min_indicator_conf,
            self.model_id(),
        ))
    }

    fn run_session(&self, normalized: &[Vec<f64>], n_features: usize) -> Result<f64, MarketDataError> {
        let session_lock = self
            .session
            .as_ref()
            .expect("run_session only called in LOADED state");
        let mut session = session_lock.lock().unwrap_or_else(|e| e.into_inner());

        let flat: Vec<f32> = normalized.iter().flatten().map(|&v| v as f32).collect();
        let shape = vec![1usize, normalized.len(), n_features];

        let input_value = ort::value::Value::from_array((shape.as_slice(), flat))
            .map_err(|e| MarketDataError::UpstreamUnavailable {
                attempts: 1,
                last_status: None,
                reason: format!("failed to build model input tensor: {e}"),
            })?;
        let inputs = ort::inputs![input_value];

        let outputs = session.run(inputs).map_err(|e| MarketDataError::UpstreamUnavailable {
            attempts: 1,
            last_status: None,
            reason: format!("model inference failed: {e}"),
        })?;

        let (_, output_value) = outputs
            .iter()
            .next()
            .ok_or_else(|| MarketDataError::UpstreamUnavailable {
                attempts: 1,
                last_status: None,
                reason: "model produced no outputs".to_string(),
            })?;
        let tensor = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| MarketDataError::UpstreamUnavailable {
                attempts: 1,
                last_status: None,
                reason: format!("failed to extract model output: {e}"),
            })?;
        let scalar = tensor
            .1
            .iter()
            .next()
            .ok_or_else(|| MarketDataError::UpstreamUnavailable {
                attempts: 1,
                last_status: None,
                reason: "model output tensor was empty".to_string(),
            })?;
        Ok(*scalar as f64)
    }
}

/// The decision rule, bit-exact: tie-breaks are strict `>` on the primary
/// threshold and `>=` on vote thresholds. Free of any model/session
/// dependency so it can be tested directly against concrete scenarios.
pub fn decide(
    prob: f64,
    latest: &crate::features::FeatureRow,
    uncertainty: Option<f64>,
    thresh_buy: f64,
    min_indicator_conf: f64,
    model_id: String,
) -> Signal {
    let mut votes = 0.0;
    let mut contributions = Vec::new();

    if latest.rsi < 30.0 {
        votes += 1.0;
        contributions.push(format!("RSI(14) oversold: {:.2} < 30", latest.rsi));
    } else if latest.rsi < 40.0 {
        votes += 0.5;
        contributions.push(format!(
            "RSI(14) approaching oversold: {:.2} in [30, 40)",
            latest.rsi
        ));
    }
    if latest.macd_histogram > 0.0 {
        votes += 1.0;
        contributions.push(format!(
            "MACD histogram positive: {:.4} > 0",
            latest.macd_histogram
        ));
    }
    if latest.bb_position < 0.2 {
        votes += 1.0;
        contributions.push(format!(
            "Bollinger position near lower band: {:.2} < 0.2",
            latest.bb_position
        ));
    }
    if latest.ema_9 > latest.ema_26 {
        votes += 0.5;
        contributions.push("EMA(9) above EMA(26): trend confirmation".to_string());
    }

    let buy_ready = prob > thresh_buy;
    let hold_ready = prob > HOLD_PROB_FACTOR * thresh_buy;

    let decision = if buy_ready && votes >= min_indicator_conf {
        Decision::Buy
    } else if hold_ready && votes >= HOLD_VOTE_THRESHOLD {
        Decision::Hold
    } else {
        Decision::Pass
    };

    let mut reasoning = Vec::new();
    let prob_cmp = if buy_ready { ">" } else { "<=" };
    reasoning.push(format!(
        "model probability {:.2} {} threshold {:.2}",
        prob, prob_cmp, thresh_buy
    ));

    let (vote_threshold, vote_label) = if buy_ready {
        (min_indicator_conf, "BUY")
    } else if hold_ready {
        (HOLD_VOTE_THRESHOLD, "HOLD")
    } else {
        (min_indicator_conf, "BUY")
    };
    let vote_cmp = if votes >= vote_threshold { ">=" } else { "<" };
    reasoning.push(format!(
        "{vote_label} vote sum {:.1} {} threshold {:.1}",
        votes, vote_cmp, vote_threshold
    ));
    reasoning.extend(contributions);

    let mut confidence = prob;
    if let Some(u) = uncertainty
        && u > UNCERTAINTY_THRESHOLD
    {
        confidence *= UNCERTAINTY_CONFIDENCE_PENALTY;
        reasoning.push(format!("high prediction uncertainty ({:.2}%)", u * 100.0));
    }

    Signal {
        decision,
        confidence,
        probability: prob,
        uncertainty,
        model_id,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;
    use chrono::Utc;

    fn row(rsi: f64, macd_histogram: f64, bb_position: f64, ema_9: f64, ema_26: f64) -> FeatureRow {
        FeatureRow {
            timestamp: Utc::now(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
            rsi,
            rsi_6: rsi,
            stoch_k: 50.0,
            stoch_d: 50.0,
            macd: macd_histogram,
            macd_signal: 0.0,
            macd_histogram,
            bb_upper: 105.0,
            bb_middle: 100.0,
            bb_lower: 95.0,
            bb_width: 0.1,
            bb_position,
            ema_9,
            ema_12: ema_9,
            ema_26,
            ema_50: ema_26,
            ema_200: ema_26,
            sma_20: 100.0,
            sma_50: 100.0,
            sma_200: 100.0,
            atr: 1.0,
            hv_20: 0.1,
            vwap: 100.0,
            obv: 0.0,
            volume_ratio: 1.0,
            price_change_1: 0.0,
            price_change_5: 0.0,
            price_change_10: 0.0,
            body_size: 0.01,
            upper_shadow: 0.0,
            lower_shadow: 0.0,
        }
    }

    #[test]
    fn happy_path_buy_scenario() {
        let latest = row(25.0, 0.5, 0.1, 10.0, 9.0);
        let signal = decide(0.9, &latest, None, 0.60, 3.0, "m1".to_string());
        assert_eq!(signal.decision, Decision::Buy);
        assert_eq!(signal.confidence, 0.9);
        assert!(signal.reasoning.iter().any(|r| r.contains("0.90")));
    }

    #[test]
    fn borderline_hold_scenario() {
        let latest = row(25.0, 0.5, 0.1, 10.0, 9.0);
        let signal = decide(0.55, &latest, None, 0.60, 3.0, "m1".to_string());
        assert_eq!(signal.decision, Decision::Hold);
        assert_eq!(signal.confidence, 0.55);
    }

    #[test]
    fn uncertainty_downgrades_confidence_but_not_decision() {
        let latest = row(25.0, 0.5, 0.1, 10.0, 9.0);
        let signal = decide(0.72, &latest, Some(0.20), 0.60, 3.0, "m1".to_string());
        assert_eq!(signal.decision, Decision::Buy);
        assert!((signal.confidence - 0.612).abs() < 1e-9);
        assert!(
            signal
                .reasoning
                .iter()
                .any(|r| r.contains("high prediction uncertainty (20.00%)"))
        );
    }

    #[test]
    fn low_uncertainty_does_not_adjust_confidence() {
        let latest = row(25.0, 0.5, 0.1, 10.0, 9.0);
        let signal = decide(0.72, &latest, Some(0.05), 0.60, 3.0, "m1".to_string());
        assert_eq!(signal.confidence, 0.72);
    }

    #[test]
    fn decision_is_monotone_in_probability() {
        let latest = row(25.0, 0.5, 0.1, 10.0, 9.0);
        let rank = |d: Decision| match d {
            Decision::Pass => 0,
            Decision::Hold => 1,
            Decision::Buy => 2,
        };
        let mut last_rank = 0;
        for i in 0..=100 {
            let prob = i as f64 / 100.0;
            let signal = decide(prob, &latest, None, 0.60, 3.0, "m1".to_string());
            let r = rank(signal.decision);
            assert!(r >= last_rank, "decision regressed as probability increased");
            last_rank = r;
        }
    }

    #[test]
    fn no_votes_never_reaches_buy_regardless_of_probability() {
        let latest = row(50.0, -1.0, 0.9, 9.0, 10.0);
        let signal = decide(0.99, &latest, None, 0.60, 3.0, "m1".to_string());
        assert_ne!(signal.decision, Decision::Buy);
    }
}
