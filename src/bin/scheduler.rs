// Nirvana scheduler — background evaluation loop entry point: dotenv load,
// `tracing_subscriber::fmt` with `EnvFilter`, build shared state, spawn the
// long-running loop, then block on `tokio::signal::ctrl_c()` for graceful
// shutdown.

use nirvana_signal_service::application::{Scheduler, ShutdownFlag};
use nirvana_signal_service::inference::engine::InferenceEngine;
use nirvana_signal_service::infrastructure::market_data::MarketDataClient;
use nirvana_signal_service::settings::Settings;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log_format {
        nirvana_signal_service::settings::LogFormat::Json => subscriber.json().init(),
        nirvana_signal_service::settings::LogFormat::Text => subscriber.init(),
    }

    if !settings.enable_scheduler {
        info!("ENABLE_SCHEDULER is false; exiting without starting the loop");
        return Ok(());
    }

    info!("nirvana scheduler starting up");

    let market_data = Arc::new(MarketDataClient::new(
        settings.rest_base.clone(),
        settings.backoff_max_retries,
        settings.backoff_jitter,
    ));

    let engine = Arc::new(InferenceEngine::load(Path::new(&settings.model_dir), &settings));
    if engine.is_degraded() {
        warn!("inference engine is degraded: every evaluation will yield PASS");
    }

    let shutdown = ShutdownFlag::new();
    let scheduler = Scheduler::new(settings, market_data, engine, shutdown.clone());

    let mut loop_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    tokio::select! {
        _ = &mut loop_handle => {
            info!("scheduler loop exited on its own");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received, finishing in-flight cycle");
            shutdown.request_shutdown();
            let _ = loop_handle.await;
        }
    }

    info!("nirvana scheduler shut down complete");
    Ok(())
}
