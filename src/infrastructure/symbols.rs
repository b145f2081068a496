//! Symbol selector: produces the active universe — the top-N USDT pairs by
//! 24h quote volume, leveraged tokens excluded, with a static fallback list
//! when the upstream ticker fetch fails.

use crate::infrastructure::market_data::MarketDataClient;
use tracing::warn;

const LEVERAGED_TOKEN_MARKERS: &[&str] = &["DOWN", "UP", "BULL", "BEAR"];

/// Fixed fallback universe used when the upstream ticker fetch fails.
/// Never raises — the scheduler must always have a universe.
pub const FALLBACK_SYMBOLS: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT", "AVAXUSDT", "DOGEUSDT",
    "DOTUSDT", "MATICUSDT", "LINKUSDT", "LTCUSDT", "UNIUSDT", "ATOMUSDT", "ETCUSDT", "XLMUSDT",
    "ALGOUSDT", "VETUSDT", "FILUSDT", "TRXUSDT",
];

/// Produces the active universe: the top `top_n` USDT pairs by 24h quote
/// volume, leveraged tokens excluded. On any upstream error, returns the
/// static fallback list and logs a warning — this function never returns
/// an error to its caller.
pub async fn get_top_n_usdt(client: &MarketDataClient, top_n: usize) -> Vec<String> {
    match client.get_24h_tickers().await {
        Ok(tickers) => {
            let mut candidates: Vec<(String, f64)> = tickers
                .into_iter()
                .filter(|t| t.symbol.ends_with("USDT"))
                .filter(|t| !LEVERAGED_TOKEN_MARKERS.iter().any(|m| t.symbol.contains(m)))
                .map(|t| {
                    let volume = t.quote_volume_f64();
                    (t.symbol, volume)
                })
                .collect();

            candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            candidates
                .into_iter()
                .take(top_n)
                .map(|(symbol, _)| symbol)
                .collect()
        }
        Err(e) => {
            warn!("failed to fetch top-N USDT universe ({e}); using fallback symbol list");
            FALLBACK_SYMBOLS
                .iter()
                .take(top_n)
                .map(|s| s.to_string())
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_list_has_twenty_entries() {
        assert_eq!(FALLBACK_SYMBOLS.len(), 20);
        assert_eq!(FALLBACK_SYMBOLS[0], "BTCUSDT");
    }

    #[test]
    fn fallback_list_contains_only_usdt_pairs() {
        assert!(FALLBACK_SYMBOLS.iter().all(|s| s.ends_with("USDT")));
    }
}
