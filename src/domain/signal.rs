//! The Signal data model — the decision record returned to callers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Hold,
    Pass,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Hold => write!(f, "HOLD"),
            Decision::Pass => write!(f, "PASS"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub decision: Decision,
    pub confidence: f64,
    pub probability: f64,
    pub uncertainty: Option<f64>,
    pub model_id: String,
    pub reasoning: Vec<String>,
}
