// Nirvana signal service — HTTP entry point: dotenv load,
// `tracing_subscriber::fmt` with `EnvFilter`, build shared state, bind and
// serve with `axum::serve`, then block on `tokio::signal::ctrl_c()`.

use nirvana_signal_service::application::signal_service::{router, AppState};
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

    info!("nirvana signal service starting up");

    let market_data = Arc::new(MarketDataClient::new(
        settings.rest_base.clone(),
        settings.backoff_max_retries,
        settings.backoff_jitter,
    ));

    let engine = Arc::new(InferenceEngine::load(Path::new(&settings.model_dir), &settings));
    if engine.is_degraded() {
        warn!("inference engine is degraded: every /signal call will return PASS");
    }

    let state = Arc::new(AppState::new(market_data.clone(), engine, &settings));
    let app = router(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "signal service listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                warn!("server exited with error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received");
        }
    }

    market_data.close().await;
    info!("nirvana signal service shut down complete");
    Ok(())
}
