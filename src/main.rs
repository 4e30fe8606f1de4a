//! Pool Sentry Daemon
//!
//! Usage:
//!   cargo run --release
//!
//! Environment:
//!   RPC_URLS          - Comma-separated JSON-RPC endpoints, in priority order (required)
//!   API_BIND          - Read API address (default: 0.0.0.0:8080)
//!   STORE_DIR         - Directory for JSONL persistence (optional)
//!   SENTIMENT_URL     - Remote sentiment scorer (optional, lexicon otherwise)
//!   ALERT_WEBHOOK_URL - Alert webhook (optional)
//!   RUST_LOG          - Log level (default: info)

use futures_util::future::join_all;
use pool_sentry::api::{create_router, AppState};
use pool_sentry::core::{
    AlertSink, EventStore, HttpSentiment, JsonlStore, LexiconSentiment, LogSink, Monitor,
    NullStore, PoolRegistry, SentimentAnalyzer, StrategyEngine, WebhookSink,
};
use pool_sentry::models::{EndpointHealth, SentryConfig};
use pool_sentry::providers::{mask_url, ChainClient, HttpTransport};
use pool_sentry::utils::constants::{APP_NAME, APP_VERSION, CACHE_SWEEP_SECS, CHAIN_ID_BASE};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    info!("🛰️ {} v{} starting", APP_NAME, APP_VERSION);

    let config = SentryConfig::from_env()?;

    // ============================================
    // CHAIN CLIENT
    // ============================================
    let transport = Arc::new(HttpTransport::new(config.chain.request_timeout)?);
    let client = Arc::new(ChainClient::new(config.chain.clone(), transport)?);
    match client.connect().await {
        Ok(chain_id) if chain_id != CHAIN_ID_BASE => warn!(
            "⚠️ {} reports chain {}, factory defaults target Base ({})",
            mask_url(&client.current_endpoint()),
            chain_id,
            CHAIN_ID_BASE
        ),
        Ok(_) => {}
        Err(e) => warn!("⚠️ Initial connection failed, loops will keep retrying: {}", e),
    }

    // Escalate when the whole endpoint list is down
    let mut endpoint_events = client.subscribe();
    let watch_client = client.clone();
    tokio::spawn(async move {
        loop {
            match endpoint_events.recv().await {
                Ok(event) if event.to == EndpointHealth::Dead => {
                    let endpoints = watch_client.health_map();
                    if endpoints.iter().all(|ep| ep.health == EndpointHealth::Dead) {
                        error!("💀 All {} RPC endpoints are dead", endpoints.len());
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!("⚠️ Missed {} endpoint events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // ============================================
    // COLLABORATORS
    // ============================================
    let store: Arc<dyn EventStore> = match &config.store_dir {
        Some(dir) => Arc::new(JsonlStore::open(dir).await?),
        None => Arc::new(NullStore),
    };

    let sentiment: Arc<dyn SentimentAnalyzer> = match &config.sentiment_url {
        Some(url) => {
            info!("💬 Remote sentiment scorer: {}", url);
            Arc::new(HttpSentiment::new(url.clone(), config.strategy.sentiment_timeout)?)
        }
        None => Arc::new(LexiconSentiment::new()),
    };

    let registry = PoolRegistry::new();
    let engine = Arc::new(StrategyEngine::new(
        config.strategy.clone(),
        registry.clone(),
        sentiment,
        store.clone(),
    ));

    engine.register_sink(Arc::new(LogSink));
    if let Some(url) = &config.alert_webhook_url {
        let sink: Arc<dyn AlertSink> =
            Arc::new(WebhookSink::new(url.clone(), config.strategy.sink_timeout)?);
        engine.register_sink(sink);
        info!("📨 Alert webhook registered");
    }

    // ============================================
    // BACKGROUND TASKS
    // ============================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = Arc::new(Monitor::new(
        client.clone(),
        registry.clone(),
        engine.clone(),
        store,
        config.monitor.clone(),
    ));
    let loops = monitor.spawn(shutdown_rx.clone());
    info!("👀 {} polling loops started", loops.len());

    // Cache sweep + signal pruning every 60 seconds
    let sweep_client = client.clone();
    let sweep_engine = engine.clone();
    let mut sweep_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(CACHE_SWEEP_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep_client.cache().cleanup_expired();
                    sweep_engine.prune(chrono::Utc::now()).await;
                }
                _ = sweep_shutdown.changed() => break,
            }
        }
    });

    // ============================================
    // READ API
    // ============================================
    let state = Arc::new(AppState::new(engine.clone(), registry, client.clone()));
    let app = create_router(state);
    let listener = TcpListener::bind(config.api_bind).await?;
    info!("🚀 Read API listening on http://{}", config.api_bind);
    info!("Press Ctrl+C for graceful shutdown");

    let mut api_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = api_shutdown.changed().await;
            })
            .await
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for Ctrl+C: {}", e);
    }

    // Graceful shutdown sequence
    info!("🛑 Shutdown signal received, stopping loops...");
    let _ = shutdown_tx.send(true);

    for result in join_all(loops).await {
        if let Err(e) = result {
            warn!("⚠️ Polling loop ended abnormally: {}", e);
        }
    }
    match server.await {
        Ok(Err(e)) => warn!("⚠️ Read API error: {}", e),
        Err(e) => warn!("⚠️ Read API task failed: {}", e),
        Ok(Ok(())) => {}
    }

    let stats = engine.get_stats().await;
    info!("📊 Final stats:");
    info!("   Pools monitored: {}", stats.monitored_pools);
    info!("   Events processed: {}", stats.total_events);
    info!("   Signals (24h): {}", stats.total_signals);
    info!("   Alerts fired: {}", stats.total_alerts);
    info!("   {}", client.cache_stats());

    info!("👋 {} shutdown complete", APP_NAME);
    Ok(())
}
