//! Model artifact metadata: `metadata.json` alongside the frozen model and
//! normalizer parameters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub n_features: usize,
    pub seq_len: usize,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub trained_at: String,
    #[serde(default)]
    pub test_metrics: serde_json::Value,
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

fn default_model_id() -> String {
    "unknown".to_string()
}

impl ModelMetadata {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
