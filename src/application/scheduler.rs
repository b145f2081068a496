//! Scheduler loop: the long-running driver that repeats the
//! market-data → feature → inference → signal pipeline per symbol and
//! timeframe, one bounded-concurrency fan-out per timeframe — timeframes
//! are serialized, symbols within a timeframe are not.

use crate::domain::signal::Signal;
use crate::errors::MarketDataError;
use crate::inference::engine::InferenceEngine;
use crate::infrastructure::market_data::MarketDataClient;
use crate::infrastructure::symbols::get_top_n_usdt;
use crate::settings::{Settings, Timeframe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Cooperative shutdown flag (`enable_scheduler`). Checked between
/// cycles; in-flight tasks are allowed to complete.
#[derive(Clone)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn request_shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the scheduler loop to completion (or until `shutdown` is
/// requested). Owns no state beyond what's passed in — `engine` and
/// `market_data` are shared, read-only references for the process lifetime.
pub struct Scheduler {
    settings: Settings,
    market_data: Arc<MarketDataClient>,
    engine: Arc<InferenceEngine>,
    shutdown: ShutdownFlag,
}

impl Scheduler {
    pub fn new(
        settings: Settings,
        market_data: Arc<MarketDataClient>,
        engine: Arc<InferenceEngine>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            settings,
            market_data,
            engine,
            shutdown,
        }
    }

    /// Runs the main loop: load the universe once, then cycle timeframes
    /// in order, each dispatching one task per symbol under a bounded
    /// semaphore. Exceptions from a task never fail the cycle. Returns
    /// once `shutdown` is requested between cycles.
    pub async fn run(&self) {
        let universe = get_top_n_usdt(&self.market_data, self.settings.top_n).await;
        info!(count = universe.len(), "active universe loaded");

        let mut cycle: u64 = 0;
        loop {
            if self.shutdown.is_shutdown() {
                info!("shutdown requested; scheduler exiting cleanly");
                break;
            }

            cycle += 1;
            info!(cycle, "starting scheduler cycle");

            for &timeframe in &self.settings.timeframes {
                self.run_timeframe(timeframe, &universe).await;
            }

            info!(cycle, "scheduler cycle complete");

            if self.shutdown.is_shutdown() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_secs(
                self.settings.fetch_interval_seconds,
            ))
            .await;
        }

        self.market_data.close().await;
    }

    /// Evaluates every symbol for one timeframe under a bounded semaphore.
    /// Across symbols, no ordering is guaranteed; this call only returns
    /// once every symbol's task has completed, so the next timeframe never
    /// starts early, preventing head-of-line starvation of the upstream.
    async fn run_timeframe(&self, timeframe: Timeframe, universe: &[String]) {
        let semaphore = Arc::new(Semaphore::new(self.settings.scheduler_concurrency));
        let warmup_candles = self.settings.seq_len + 100;

        let mut handles = Vec::with_capacity(universe.len());
        for symbol in universe {
            let permit = semaphore.clone();
            let symbol = symbol.clone();
            let market_data = self.market_data.clone();
            let engine = self.engine.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                evaluate_one(&market_data, &engine, &symbol, timeframe, warmup_candles).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(signal)) => {
                    info!(
                        decision = %signal.decision,
                        confidence = signal.confidence,
                        "signal evaluated"
                    );
                }
                Ok(Err(e)) => {
                    warn!("symbol evaluation failed, skipping this cycle: {e}");
                }
                Err(join_err) => {
                    warn!("evaluation task panicked: {join_err}");
                }
            }
        }
    }
}

async fn evaluate_one(
    market_data: &MarketDataClient,
    engine: &InferenceEngine,
    symbol: &str,
    timeframe: Timeframe,
    warmup_candles: usize,
) -> Result<Signal, MarketDataError> {
    let candles = market_data
        .get_klines(symbol, timeframe, warmup_candles as u32)
        .await?;
    engine.predict(candles.as_slice(), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_flag_starts_false_and_latches_true() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_shutdown());
        flag.request_shutdown();
        assert!(flag.is_shutdown());
    }

    #[test]
    fn shutdown_flag_clone_shares_state() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        clone.request_shutdown();
        assert!(flag.is_shutdown());
    }
}
