//! API Route Configuration

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{self, AppState};
use super::middleware::logging_middleware;
use crate::utils::constants::API_CONCURRENCY_LIMIT;

/// Create the API router with all routes and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    // Read-only surface, any origin may query it
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health & Status
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .route("/endpoints", get(handlers::endpoints))
        // Signals & Alerts
        .route("/signals/recent", get(handlers::recent_signals))
        .route("/signals/active", get(handlers::active_signals))
        .route("/alerts", get(handlers::recent_alerts))
        // Pools
        .route("/pools", get(handlers::list_pools))
        .route("/pools/:address", get(handlers::get_pool));

    Router::new()
        .nest("/v1", api_v1)
        .route("/health", get(handlers::health_check))
        .with_state(state)
        // Middleware (order matters - bottom runs first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
        .layer(ConcurrencyLimitLayer::new(API_CONCURRENCY_LIMIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::tests::pool;
    use crate::core::registry::PoolRegistry;
    use crate::core::store::NullStore;
    use crate::core::strategy::tests::FixedSentiment;
    use crate::core::strategy::StrategyEngine;
    use crate::models::config::{ChainClientConfig, StrategyConfig};
    use crate::models::errors::{AppError, AppResult};
    use crate::models::types::{Signal, SignalType};
    use crate::providers::rpc::ChainClient;
    use crate::providers::transport::mock::ScriptedTransport;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const POOL: &str = "0x00000000000000000000000000000000000000cc";

    fn handler(method: &str, _params: &Value) -> AppResult<Value> {
        match method {
            "eth_blockNumber" => Ok(json!("0x64")),
            _ => Err(AppError::rpc_error(-32601, "method not found")),
        }
    }

    fn state() -> Arc<AppState> {
        let registry = PoolRegistry::new();
        registry.register(pool(POOL, 10));
        registry.register(pool("0x00000000000000000000000000000000000000dd", 20));

        let engine = Arc::new(StrategyEngine::new(
            StrategyConfig::default(),
            registry.clone(),
            Arc::new(FixedSentiment::new(0.0, 0.0)),
            Arc::new(NullStore),
        ));
        let client = Arc::new(
            ChainClient::new(
                ChainClientConfig::new(vec![
                    "https://base-mainnet.g.alchemy.com/v2/secret".into(),
                    "http://backup".into(),
                ]),
                Arc::new(ScriptedTransport::new(handler)),
            )
            .unwrap(),
        );
        Arc::new(AppState::new(engine, registry, client))
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_masks_endpoint_key() {
        let (status, body) = get_json(state(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
        assert_eq!(
            body["data"]["current_endpoint"],
            "https://base-mainnet.g.alchemy.com/v2/***HIDDEN***"
        );
    }

    #[tokio::test]
    async fn test_pools_since_filters_by_creation_block() {
        let (status, body) = get_json(state(), "/v1/pools?since=15").await;
        assert_eq!(status, StatusCode::OK);
        let pools = body["data"].as_array().unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0]["address"], "0x00000000000000000000000000000000000000dd");

        let (_, body) = get_json(state(), "/v1/pools").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_pool_is_404() {
        let (status, body) = get_json(state(), "/v1/pools/0xdeadbeef").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "API_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_signals_are_served_newest_first() {
        let state = state();
        state
            .engine
            .submit(Signal::new(SignalType::WhaleBuy, POOL, 0.8, Value::Null))
            .await;
        state
            .engine
            .submit(Signal::new(SignalType::LiquiditySpike, POOL, 0.6, Value::Null))
            .await;

        let (status, body) = get_json(state.clone(), "/v1/signals/recent?limit=1").await;
        assert_eq!(status, StatusCode::OK);
        let signals = body["data"].as_array().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0]["signal_type"], "liquidity_spike");

        let (_, body) = get_json(state, "/v1/signals/active").await;
        let active = body["data"].as_array().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["signals"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_limit_out_of_range_is_rejected() {
        let (status, body) = get_json(state(), "/v1/alerts?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "API_BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_endpoints_and_stats() {
        let state = state();
        let (status, body) = get_json(state.clone(), "/v1/endpoints").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["endpoints"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["endpoints"][0]["is_current"], true);

        let (_, body) = get_json(state, "/v1/stats").await;
        assert_eq!(body["data"]["monitored_pools"], 2);
        assert_eq!(body["data"]["total_alerts"], 0);
        assert_eq!(body["data"]["api_version"], "v1");
    }
}
