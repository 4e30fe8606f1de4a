//! API Request Handlers

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Instant;

use super::types::*;
use crate::core::registry::PoolRegistry;
use crate::core::strategy::StrategyEngine;
use crate::models::errors::AppError;
use crate::models::types::{AlertRecord, EndpointStatus, Pool, PoolSignals, SignalView};
use crate::providers::rpc::ChainClient;
use crate::providers::transport::mask_url;
use crate::utils::constants::{APP_VERSION, MAX_API_PAGE};

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

/// Shared application state
pub struct AppState {
    pub engine: Arc<StrategyEngine>,
    pub registry: PoolRegistry,
    pub client: Arc<ChainClient>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Arc<StrategyEngine>, registry: PoolRegistry, client: Arc<ChainClient>) -> Self {
        Self {
            engine,
            registry,
            client,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn reject(err: AppError, start: Instant) -> (StatusCode, Json<ApiResponse<()>>) {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ApiResponse::error(ApiError::from(&err), elapsed_ms(start))))
}

fn check_limit(limit: usize, start: Instant) -> Result<usize, (StatusCode, Json<ApiResponse<()>>)> {
    if limit == 0 || limit > MAX_API_PAGE {
        return Err(reject(
            AppError::bad_request(format!("limit must be between 1 and {}", MAX_API_PAGE)),
            start,
        ));
    }
    Ok(limit)
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: APP_VERSION.to_string(),
        uptime_seconds: state.uptime_seconds(),
        current_endpoint: mask_url(&state.client.current_endpoint()),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Stats
// ============================================

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatsData>> {
    let start = Instant::now();

    let data = StatsData {
        engine: state.engine.get_stats().await,
        cache: state.client.cache_stats(),
        uptime_seconds: state.uptime_seconds(),
        api_version: "v1".to_string(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Signals
// ============================================

pub async fn recent_signals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<SignalView>> {
    let start = Instant::now();
    let limit = check_limit(query.limit, start)?;

    let signals = state.engine.get_recent_signals(limit).await;
    Ok(Json(ApiResponse::success(signals, elapsed_ms(start))))
}

pub async fn active_signals(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<PoolSignals>>> {
    let start = Instant::now();
    let active = state.engine.get_current_active_signals().await;
    Json(ApiResponse::success(active, elapsed_ms(start)))
}

// ============================================
// Pools
// ============================================

pub async fn list_pools(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SinceQuery>,
) -> Json<ApiResponse<Vec<Pool>>> {
    let start = Instant::now();
    let pools = state.registry.list_since(query.since);
    Json(ApiResponse::success(pools, elapsed_ms(start)))
}

pub async fn get_pool(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<Pool> {
    let start = Instant::now();

    match state.registry.get(&address) {
        Some(pool) => Ok(Json(ApiResponse::success(pool, elapsed_ms(start)))),
        None => Err(reject(
            AppError::not_found(format!("Pool {} is not registered", address.to_lowercase())),
            start,
        )),
    }
}

// ============================================
// Alerts
// ============================================

pub async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<AlertRecord>> {
    let start = Instant::now();
    let limit = check_limit(query.limit, start)?;

    let alerts = state.engine.recent_alerts(limit).await;
    Ok(Json(ApiResponse::success(alerts, elapsed_ms(start))))
}

// ============================================
// Endpoints
// ============================================

pub async fn endpoints(State(state): State<Arc<AppState>>) -> Json<ApiResponse<EndpointsData>> {
    let start = Instant::now();

    let endpoints: Vec<EndpointStatus> = state.client.health_map();
    let data = EndpointsData {
        current: mask_url(&state.client.current_endpoint()),
        endpoints,
        cache: state.client.cache_stats(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}
