// =============================================================================
// hantu-core — standalone entry point
// =============================================================================
//
// A thin binary over the library crate: build credentials/cache/rate-limiter,
// start the WebSocket trade-frame feed, the batch fetcher on a timer, and the
// sell-side position monitor, then wait on Ctrl+C. Deployments that need a
// dashboard or an HTTP API put it in front of `hantu_core` as a separate
// crate — this binary only proves the pieces start up and talk to each other.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hantu_core::broker::{RestClient, WsClient};
use hantu_core::cache::Cache;
use hantu_core::config::{Credentials, TokenManager, TokenStore};
use hantu_core::fetcher::BatchFetcher;
use hantu_core::ratelimit::RateLimiter;
use hantu_core::sell::{PositionMonitor, PriceTick, SellEngine, SellSignalConfig};

const DEFAULT_RATE_LIMIT_PER_SEC: usize = 15;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("hantu-core starting up");

    let credentials = Credentials::from_env()?;
    info!(credentials = ?credentials, "credentials loaded");

    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let token_store = TokenStore::open(std::path::Path::new(&data_dir), credentials.server)?;
    let http = reqwest::Client::new();
    let tokens = Arc::new(TokenManager::new(credentials.clone(), token_store, http));

    let rate_limit = std::env::var("RATE_LIMIT_PER_SEC")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT_PER_SEC);
    let limiter = Arc::new(RateLimiter::new(rate_limit));

    let rest = Arc::new(RestClient::new(credentials.clone(), Arc::clone(&tokens), Arc::clone(&limiter)));
    let fetcher = BatchFetcher::new(Arc::clone(&rest));

    let redis_url = std::env::var("REDIS_URL").ok();
    let cache = Arc::new(Cache::connect(redis_url.as_deref()).await);
    info!(using_redis = cache.using_redis(), "cache backend ready");

    // The WebSocket approval_key is the REST access token itself (spec.md
    // §4.1/§4.5) — no separate issuance endpoint exists.
    let approval_key = tokens.access_token().await?;
    let ws_client = WsClient::new(credentials.server, approval_key);

    let sell_engine = Arc::new(SellEngine::new(SellSignalConfig::default()));
    let monitor = PositionMonitor::new(Arc::clone(&sell_engine), hantu_core::selection::QuantConfig::default());

    let (tick_tx, tick_rx) = mpsc::channel::<PriceTick>(256);
    ws_client.on(hantu_core::broker::ws_frames::TRADE_TR_ID, {
        let tick_tx = tick_tx.clone();
        Box::new(move |frame| {
            if let hantu_core::broker::WsFrame::Trade(trade) = frame {
                let tick = PriceTick::from_trade_frame(&trade);
                if tick_tx.try_send(tick).is_err() {
                    warn!("tick channel full, dropping trade frame");
                }
            }
        })
    });

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    let ws_task = {
        let ws_client = Arc::clone(&ws_client);
        tokio::spawn(async move { ws_client.run(cancel_rx).await })
    };

    let monitor_task = tokio::spawn(async move { monitor.run(tick_rx).await });

    let watchlist: Vec<String> = std::env::var("WATCHLIST")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let fetch_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if watchlist.is_empty() {
                continue;
            }
            let result = fetcher.batch_prices(&watchlist).await;
            info!(
                successful = result.success_count(),
                failed = result.failure_count(),
                elapsed_ms = result.total_time_ms,
                "batch price fetch complete"
            );
        }
    });

    info!("all subsystems running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");

    let _ = cancel_tx.send(true);
    fetch_task.abort();
    monitor_task.abort();
    let _ = ws_task.await;

    info!("hantu-core shut down complete");
    Ok(())
}
