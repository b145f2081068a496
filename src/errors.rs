//! Error taxonomy for the signal pipeline: several small `#[derive(Error)]`
//! enums rather than one monolithic type, one per component boundary.

use thiserror::Error;

/// Fatal at process startup; never recoverable at runtime.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required environment variable: {0}")]
    Missing(String),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

/// Errors surfaced by the market data client.
#[derive(Debug, Error)]
pub enum MarketDataError {
    /// 4xx other than 429: non-retryable, caller's fault.
    #[error("upstream rejected request with status {status}: {body}")]
    UpstreamClient { status: u16, body: String },

    /// Retries exhausted on 429 / 5xx / timeout / connection failure.
    #[error("upstream unavailable after {attempts} attempts, last status {last_status:?}: {reason}")]
    UpstreamUnavailable {
        attempts: u32,
        last_status: Option<u16>,
        reason: String,
    },

    /// Fewer than `seq_len + warmup` usable candles were returned.
    #[error("insufficient candles: got {got}, need {need}")]
    InsufficientData { got: usize, need: usize },
}

/// The inference engine could not load its artifacts.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("inference failed: {reason}")]
    InferenceFailed { reason: String },
}

/// A trade tick that could not be parsed or was internally inconsistent.
/// Always dropped with a log entry; never propagated.
#[derive(Debug, Error)]
pub enum MalformedMessage {
    #[error("malformed trade message: {reason}")]
    Trade { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_messages_name_the_field() {
        let err = ConfigurationError::Invalid {
            name: "SEQ_LEN".to_string(),
            value: "abc".to_string(),
            reason: "not an integer".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("SEQ_LEN"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn insufficient_data_reports_counts() {
        let err = MarketDataError::InsufficientData { got: 50, need: 128 };
        assert_eq!(err.to_string(), "insufficient candles: got 50, need 128");
    }
}
