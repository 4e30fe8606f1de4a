//! Chain Client - Multi-Endpoint JSON-RPC with Failover & Caching
//!
//! 1. Round-robin endpoint rotation starting from the last-known-good index
//! 2. Exactly one failover attempt per call on transport errors
//! 3. Healthy -> Degraded -> Dead after consecutive failures, with a cool-down
//! 4. TTL cache keyed by method + normalized params
//! 5. Health transitions published on a broadcast channel
//!
//! Rotation state sits behind a std `Mutex` that is never held across an await.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::models::config::ChainClientConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{
    EndpointEvent, EndpointHealth, EndpointStatus, LogFilter, RawLog, TransactionReceipt,
};
use crate::providers::transport::{mask_url, RpcTransport};
use crate::utils::cache::{CacheStats, RpcCache};

sol! {
    function decimals() external view returns (uint8);
    function balanceOf(address owner) external view returns (uint256);
}

/// Capacity of the endpoint event feed
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
struct EndpointState {
    url: String,
    health: EndpointHealth,
    consecutive_failures: u32,
    dead_until: Option<Instant>,
}

impl EndpointState {
    fn new(url: String) -> Self {
        Self {
            url,
            health: EndpointHealth::Healthy,
            consecutive_failures: 0,
            dead_until: None,
        }
    }

    /// Dead endpoints become eligible again once their cool-down has elapsed
    fn is_available(&self, now: Instant) -> bool {
        match self.health {
            EndpointHealth::Dead => self.dead_until.map_or(true, |t| now >= t),
            _ => true,
        }
    }
}

#[derive(Debug)]
struct Rotation {
    endpoints: Vec<EndpointState>,
    current: usize,
}

pub struct ChainClient {
    transport: Arc<dyn RpcTransport>,
    config: ChainClientConfig,
    rotation: Mutex<Rotation>,
    cache: RpcCache,
    events: broadcast::Sender<EndpointEvent>,
    request_id: AtomicU64,
}

impl ChainClient {
    pub fn new(config: ChainClientConfig, transport: Arc<dyn RpcTransport>) -> AppResult<Self> {
        if config.endpoints.is_empty() {
            return Err(AppError::no_endpoints_configured());
        }
        let endpoints = config
            .endpoints
            .iter()
            .cloned()
            .map(EndpointState::new)
            .collect();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            transport,
            config,
            rotation: Mutex::new(Rotation {
                endpoints,
                current: 0,
            }),
            cache: RpcCache::new(),
            events,
            request_id: AtomicU64::new(1),
        })
    }

    // ============================================
    // ROTATION
    // ============================================

    fn rotation(&self) -> MutexGuard<'_, Rotation> {
        self.rotation.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current endpoint if usable, otherwise the next available one in order
    fn select(&self) -> AppResult<(usize, String)> {
        let now = Instant::now();
        let mut rotation = self.rotation();
        let n = rotation.endpoints.len();
        for offset in 0..n {
            let idx = (rotation.current + offset) % n;
            if rotation.endpoints[idx].is_available(now) {
                rotation.current = idx;
                return Ok((idx, rotation.endpoints[idx].url.clone()));
            }
        }
        Err(AppError::no_endpoint_available())
    }

    /// Move past `failed` to the next available endpoint, if any
    fn fail_over(&self, failed: usize) -> Option<(usize, String)> {
        let now = Instant::now();
        let mut rotation = self.rotation();
        let n = rotation.endpoints.len();
        for offset in 1..n {
            let idx = (failed + offset) % n;
            if rotation.endpoints[idx].is_available(now) {
                rotation.current = idx;
                let from = mask_url(&rotation.endpoints[failed].url);
                let to = rotation.endpoints[idx].url.clone();
                info!("🔄 RPC failover: {} -> {}", from, mask_url(&to));
                return Some((idx, to));
            }
        }
        None
    }

    fn mark_failure(&self, idx: usize) {
        let event = {
            let mut rotation = self.rotation();
            let ep = &mut rotation.endpoints[idx];
            let before = ep.health;
            ep.consecutive_failures += 1;
            if ep.consecutive_failures >= self.config.dead_after {
                ep.health = EndpointHealth::Dead;
                ep.dead_until = Some(Instant::now() + self.config.cooldown);
            } else {
                ep.health = EndpointHealth::Degraded;
            }
            (before != ep.health).then(|| EndpointEvent {
                url: ep.url.clone(),
                from: before,
                to: ep.health,
            })
        };
        if let Some(event) = event {
            self.publish(event);
        }
    }

    fn mark_success(&self, idx: usize) {
        let event = {
            let mut rotation = self.rotation();
            let ep = &mut rotation.endpoints[idx];
            let before = ep.health;
            ep.consecutive_failures = 0;
            ep.dead_until = None;
            ep.health = EndpointHealth::Healthy;
            (before != EndpointHealth::Healthy).then(|| EndpointEvent {
                url: ep.url.clone(),
                from: before,
                to: EndpointHealth::Healthy,
            })
        };
        if let Some(event) = event {
            self.publish(event);
        }
    }

    fn publish(&self, event: EndpointEvent) {
        match event.to {
            EndpointHealth::Healthy => info!(
                "{} Endpoint {} recovered ({} -> {})",
                event.to.emoji(),
                mask_url(&event.url),
                event.from.as_str(),
                event.to.as_str()
            ),
            _ => warn!(
                "{} Endpoint {} {} -> {}",
                event.to.emoji(),
                mask_url(&event.url),
                event.from.as_str(),
                event.to.as_str()
            ),
        }
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ============================================
    // DISPATCH
    // ============================================

    /// One request against one endpoint, bounded by the request timeout.
    /// Any well-formed JSON-RPC answer (result or error) counts as the endpoint being alive.
    async fn dispatch(
        &self,
        idx: usize,
        url: &str,
        method: &str,
        params: &serde_json::Value,
    ) -> AppResult<serde_json::Value> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let envelope = tokio::time::timeout(self.config.request_timeout, self.transport.send(url, &payload))
            .await
            .map_err(|_| {
                AppError::rpc_timeout(format!(
                    "{} timed out after {}s on {}",
                    method,
                    self.config.request_timeout.as_secs(),
                    mask_url(url)
                ))
            })??;

        self.mark_success(idx);

        if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
            let code = error["code"].as_i64().unwrap_or_default();
            let message = error["message"].as_str().unwrap_or("unknown error");
            return Err(AppError::rpc_error(code, message));
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| AppError::invalid_response(format!("{}: no result in response", method)))
    }

    /// Issue a request with at most one failover attempt on transport errors
    pub async fn request(&self, method: &str, params: serde_json::Value) -> AppResult<serde_json::Value> {
        let (idx, url) = self.select()?;
        let first = match self.dispatch(idx, &url, method, &params).await {
            Err(e) if e.is_transport() => e,
            other => return other,
        };

        warn!("⚠️ {} failed on {}: {}", method, mask_url(&url), first);
        self.mark_failure(idx);
        let Some((next, next_url)) = self.fail_over(idx) else {
            return Err(first);
        };

        match self.dispatch(next, &next_url, method, &params).await {
            Err(e) if e.is_transport() => {
                warn!("⚠️ {} failed on {} after failover: {}", method, mask_url(&next_url), e);
                self.mark_failure(next);
                self.fail_over(next);
                Err(e)
            }
            other => other,
        }
    }

    /// `request` behind the TTL cache; null results are never cached
    pub async fn cached_request(
        &self,
        method: &str,
        params: serde_json::Value,
        ttl: Duration,
    ) -> AppResult<serde_json::Value> {
        let key = RpcCache::key(method, &params);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        let value = self.request(method, params).await?;
        if !value.is_null() {
            self.cache.set(key, value.clone(), ttl);
        }
        Ok(value)
    }

    // ============================================
    // PUBLIC API
    // ============================================

    /// Probe endpoints round-robin from the last-known-good index with `eth_chainId`.
    /// Returns the chain id of the first endpoint that answers.
    pub async fn connect(&self) -> AppResult<u64> {
        let (start, n) = {
            let rotation = self.rotation();
            (rotation.current, rotation.endpoints.len())
        };

        for offset in 0..n {
            let idx = (start + offset) % n;
            let (url, available) = {
                let rotation = self.rotation();
                let ep = &rotation.endpoints[idx];
                (ep.url.clone(), ep.is_available(Instant::now()))
            };
            if !available {
                debug!("⏭️ Skipping dead endpoint {}", mask_url(&url));
                continue;
            }

            match self.dispatch(idx, &url, "eth_chainId", &serde_json::json!([])).await {
                Ok(value) => {
                    let chain_id = parse_hex_u64(&value)?;
                    self.rotation().current = idx;
                    info!("🔗 Connected to {} (chain id {})", mask_url(&url), chain_id);
                    return Ok(chain_id);
                }
                Err(e) => {
                    warn!("❌ Liveness check failed for {}: {}", mask_url(&url), e);
                    if e.is_transport() {
                        self.mark_failure(idx);
                    }
                }
            }
        }

        Err(AppError::no_endpoint_available())
    }

    pub async fn block_number(&self) -> AppResult<u64> {
        let value = self
            .cached_request("eth_blockNumber", serde_json::json!([]), self.config.ttls.block_number)
            .await?;
        parse_hex_u64(&value)
    }

    /// Ranges wider than `max_block_range` are rejected before any RPC is issued
    pub async fn logs(&self, filter: &LogFilter) -> AppResult<Vec<RawLog>> {
        let span = filter.span();
        if span > self.config.max_block_range {
            return Err(AppError::range_too_large(span, self.config.max_block_range));
        }
        if span == 0 {
            return Ok(Vec::new());
        }

        let value = self
            .cached_request("eth_getLogs", filter.to_params(), self.config.ttls.logs)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn transaction_receipt(&self, hash: B256) -> AppResult<Option<TransactionReceipt>> {
        let params = serde_json::json!([format!("0x{}", hex::encode(hash))]);
        let value = self
            .cached_request("eth_getTransactionReceipt", params, self.config.ttls.receipt)
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Read-only `eth_call` against the latest block
    pub async fn call(&self, to: Address, data: Bytes) -> AppResult<Bytes> {
        let params = serde_json::json!([{ "to": to, "data": data }, "latest"]);
        let value = self
            .cached_request("eth_call", params, self.config.ttls.call)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn token_decimals(&self, token: Address) -> AppResult<u8> {
        let output = self.call(token, decimalsCall {}.abi_encode().into()).await?;
        let decoded = decimalsCall::abi_decode_returns(&output, true)
            .map_err(|e| AppError::decode_failed(format!("decimals() of {}: {}", token, e)))?;
        Ok(decoded._0)
    }

    pub async fn token_balance(&self, token: Address, holder: Address) -> AppResult<U256> {
        let output = self
            .call(token, balanceOfCall { owner: holder }.abi_encode().into())
            .await?;
        let decoded = balanceOfCall::abi_decode_returns(&output, true)
            .map_err(|e| AppError::decode_failed(format!("balanceOf() of {}: {}", token, e)))?;
        Ok(decoded._0)
    }

    // ============================================
    // OPERATIONAL STATE
    // ============================================

    /// Feed of endpoint health transitions
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.events.subscribe()
    }

    pub fn current_endpoint(&self) -> String {
        let rotation = self.rotation();
        rotation.endpoints[rotation.current].url.clone()
    }

    pub fn health_map(&self) -> Vec<EndpointStatus> {
        let now = Instant::now();
        let rotation = self.rotation();
        rotation
            .endpoints
            .iter()
            .enumerate()
            .map(|(idx, ep)| EndpointStatus {
                url: mask_url(&ep.url),
                health: ep.health,
                consecutive_failures: ep.consecutive_failures,
                is_current: idx == rotation.current,
                retry_in_secs: ep
                    .dead_until
                    .filter(|_| ep.health == EndpointHealth::Dead)
                    .map(|t| t.saturating_duration_since(now).as_secs()),
            })
            .collect()
    }

    pub fn cache(&self) -> &RpcCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn max_block_range(&self) -> u64 {
        self.config.max_block_range
    }
}

/// Parse a `0x`-prefixed quantity
pub fn parse_hex_u64(value: &serde_json::Value) -> AppResult<u64> {
    let s = value
        .as_str()
        .ok_or_else(|| AppError::invalid_response(format!("expected hex quantity, got {}", value)))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| AppError::invalid_response(format!("invalid hex quantity: {}", s)))
}
