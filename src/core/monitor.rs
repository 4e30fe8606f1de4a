//! Pool Monitor
//!
//! Independent, indefinitely running polling loops:
//! - one factory loop per configured factory (V2 PairCreated, V3 PoolCreated)
//! - one pool-activity loop over young pools (Mint / Swap)
//!
//! A failed iteration is logged and followed by a jittered back-off; loops only
//! stop on the shutdown signal, and only between iterations.

use alloy_primitives::{Address, U256};
use rand::Rng;
use serde_json::json;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::classifier::Classifier;
use crate::core::registry::PoolRegistry;
use crate::core::store::{log_store_error, EventStore};
use crate::core::strategy::StrategyEngine;
use crate::models::config::{FactoryConfig, MonitorConfig};
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{
    normalize_address, short_address, LogFilter, Pool, PoolEvent, PoolEventKind, Signal,
    SignalType,
};
use crate::providers::rpc::ChainClient;
use crate::utils::constants::NEW_POOL_CONFIDENCE;
use crate::utils::decoder::{activity_topics, creation_topics, decode_log, pool_from_creation};

pub struct Monitor {
    client: Arc<ChainClient>,
    registry: PoolRegistry,
    engine: Arc<StrategyEngine>,
    classifier: Classifier,
    store: Arc<dyn EventStore>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        client: Arc<ChainClient>,
        registry: PoolRegistry,
        engine: Arc<StrategyEngine>,
        store: Arc<dyn EventStore>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            client,
            registry,
            engine,
            classifier: Classifier::new(config.classifier.clone()),
            store,
            config,
        }
    }

    /// Start every loop; each one exits after its current iteration once
    /// `shutdown` flips to `true` (or its sender is dropped).
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<JoinHandle<()>> = self
            .config
            .factories
            .iter()
            .cloned()
            .map(|factory| {
                let monitor = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { monitor.run_factory_loop(factory, shutdown).await })
            })
            .collect();

        let monitor = self.clone();
        handles.push(tokio::spawn(async move {
            monitor.run_activity_loop(shutdown).await
        }));
        handles
    }

    // ============================================
    // LOOPS
    // ============================================

    async fn run_factory_loop(self: Arc<Self>, factory: FactoryConfig, mut shutdown: watch::Receiver<bool>) {
        let label = format!(
            "{} factory {}",
            factory.version.as_str(),
            short_address(&normalize_address(&factory.address))
        );
        info!("🏭 Factory loop started: {}", label);
        let mut cursor: Option<u64> = None;

        while !*shutdown.borrow() {
            let delay = match self.poll_factory(&factory, &mut cursor).await {
                Ok(created) => {
                    if created > 0 {
                        info!("🏭 {}: {} new pool(s), cursor at {:?}", label, created, cursor);
                    }
                    self.config.factory_interval
                }
                Err(e) => {
                    log_iteration_error(&label, &e);
                    self.backoff()
                }
            };
            if !sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }
        info!("🛑 Factory loop stopped: {}", label);
    }

    async fn run_activity_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("📡 Pool activity loop started");
        while !*shutdown.borrow() {
            let delay = match self.poll_activity().await {
                Ok(signals) => {
                    if signals > 0 {
                        info!("📡 Activity cycle produced {} signal(s)", signals);
                    }
                    self.config.pool_interval
                }
                Err(e) => {
                    log_iteration_error("Activity loop", &e);
                    self.backoff()
                }
            };
            if !sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }
        info!("🛑 Pool activity loop stopped");
    }

    fn backoff(&self) -> Duration {
        let base = self.config.error_backoff.as_millis() as u64;
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base + jitter)
    }

    // ============================================
    // FACTORY POLLING
    // ============================================

    /// Fetch creation logs over `[cursor + 1, head]` in range-bounded chunks.
    /// The cursor advances only after a chunk has been fully processed.
    pub async fn poll_factory(&self, factory: &FactoryConfig, cursor: &mut Option<u64>) -> AppResult<usize> {
        let head = self.client.block_number().await?;
        let from = match *cursor {
            Some(last) => last + 1,
            None => head.saturating_sub(self.config.initial_lookback_blocks),
        };
        if from > head {
            return Ok(0);
        }

        let factory_address = normalize_address(&factory.address);
        let max_range = self.client.max_block_range();
        let mut created = 0;
        let mut start = from;
        while start <= head {
            let end = head.min(start + max_range - 1);
            let filter = LogFilter::new(start, end)
                .address(factory.address)
                .topics(creation_topics());
            let logs = self.client.logs(&filter).await?;
            debug!("🏭 {} creation logs in [{}, {}]", logs.len(), start, end);

            for log in &logs {
                match decode_log(log, None) {
                    Ok(Some(event)) if event.is_creation() => {
                        if self.handle_creation(&factory_address, event).await {
                            created += 1;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("🧩 Dropping undecodable log: {}", e),
                }
            }

            *cursor = Some(end);
            start = end + 1;
        }
        Ok(created)
    }

    /// Register a newly created pool. Returns `false` for already known pools,
    /// which also suppresses a duplicate `new_pool` signal on replay.
    async fn handle_creation(&self, factory: &str, event: PoolEvent) -> bool {
        let Some(mut pool) = pool_from_creation(&event, factory) else {
            return false;
        };
        if self.registry.contains(&pool.address) {
            debug!("♻️ Pool {} already registered", pool.address);
            return false;
        }

        pool.token0_decimals = self.decimals_of(&pool.token0).await;
        pool.token1_decimals = self.decimals_of(&pool.token1).await;
        if !self.registry.register(pool.clone()) {
            return false;
        }

        info!(
            pool = %pool.address,
            "🆕 New {} pool {} (block {})",
            pool.version.as_str(),
            pool.pair_label(),
            pool.created_block
        );
        log_store_error("pool", self.store.save_pool(&pool).await);
        self.engine.record_event(&event, None).await;

        let fee = match event.kind {
            PoolEventKind::PoolCreated { fee, .. } => Some(fee),
            _ => None,
        };
        let signal = Signal::new(
            SignalType::NewPool,
            &pool.address,
            NEW_POOL_CONFIDENCE,
            json!({
                "version": pool.version.as_str(),
                "token0": pool.token0,
                "token1": pool.token1,
                "fee": fee,
                "block": event.block_number,
                "tx": event.tx_hash,
            }),
        );
        self.engine.submit(signal).await;
        true
    }

    async fn decimals_of(&self, token: &str) -> Option<u8> {
        let address = Address::from_str(token).ok()?;
        match self.client.token_decimals(address).await {
            Ok(decimals) => Some(decimals),
            Err(e) => {
                debug!("🔢 decimals() unavailable for {}: {}", token, e);
                None
            }
        }
    }

    // ============================================
    // ACTIVITY POLLING
    // ============================================

    /// Poll every young pool once. Per-pool failures are logged and skipped.
    pub async fn poll_activity(&self) -> AppResult<usize> {
        let head = self.client.block_number().await?;
        let active = self.registry.list_active(head, self.config.pool_max_age_blocks);
        let addresses: HashSet<String> = active.iter().map(|p| p.address.clone()).collect();
        self.classifier.retain_pools(&addresses);

        let pools: Vec<Pool> = active
            .into_iter()
            .rev()
            .take(self.config.max_pools_per_cycle)
            .collect();

        let mut signals = 0;
        for pool in &pools {
            match self.poll_pool(pool, head).await {
                Ok(n) => signals += n,
                Err(e) => warn!(pool = %pool.address, "⚠️ Pool poll failed [{}]: {}", e.code_str(), e.message),
            }
        }
        Ok(signals)
    }

    /// Process one pool's unprocessed range and move its watermark
    async fn poll_pool(&self, pool: &Pool, head: u64) -> AppResult<usize> {
        let from = pool
            .last_polled_block
            .map(|w| w + 1)
            .unwrap_or(pool.created_block);
        if from > head {
            return Ok(0);
        }
        let end = head.min(from + self.client.max_block_range() - 1);

        let address = Address::from_str(&pool.address)
            .map_err(|_| AppError::decode_failed(format!("bad pool address {}", pool.address)))?;
        let filter = LogFilter::new(from, end)
            .address(address)
            .topics(activity_topics());
        let logs = self.client.logs(&filter).await?;

        let mut reserves: Option<Option<(U256, U256)>> = None;
        let mut events = 0;
        let mut signals = 0;
        for log in &logs {
            let event = match decode_log(log, Some(pool)) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!(pool = %pool.address, "🧩 Dropping undecodable log: {}", e);
                    continue;
                }
            };

            if matches!(event.kind, PoolEventKind::Swap { .. }) && reserves.is_none() {
                reserves = Some(self.reserves(pool, address).await);
            }
            let classification = self.classifier.classify(pool, &event, reserves.flatten());
            debug!(
                pool = %pool.address,
                "🧩 {} at block {}",
                event.kind.name(),
                event.block_number
            );
            self.engine.record_event(&event, Some(&classification)).await;
            events += 1;

            if let Some(signal) = classification.signal {
                self.engine.submit(signal).await;
                signals += 1;
            }
        }

        self.registry.set_watermark(&pool.address, end);
        if events > 0 {
            self.engine.assess_sentiment(&pool.address).await;
        }
        Ok(signals)
    }

    async fn reserves(&self, pool: &Pool, pool_address: Address) -> Option<(U256, U256)> {
        let token0 = Address::from_str(&pool.token0).ok()?;
        let token1 = Address::from_str(&pool.token1).ok()?;
        let r0 = self.client.token_balance(token0, pool_address).await;
        let r1 = self.client.token_balance(token1, pool_address).await;
        match (r0, r1) {
            (Ok(r0), Ok(r1)) => Some((r0, r1)),
            (Err(e), _) | (_, Err(e)) => {
                debug!(pool = %pool.address, "🏦 Reserves unavailable: {}", e);
                None
            }
        }
    }
}

fn log_iteration_error(loop_name: &str, e: &AppError) {
    if e.code.is_retryable() {
        warn!("⚠️ {} iteration failed [{}]: {}", loop_name, e.code_str(), e.message);
    } else {
        error!("❌ {} iteration failed [{}]: {}", loop_name, e.code_str(), e.message);
    }
}

/// Sleep for `delay` unless shutdown arrives first. Returns `false` on shutdown.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => !*shutdown.borrow(),
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sentiment::LexiconSentiment;
    use crate::core::store::NullStore;
    use crate::core::strategy::tests::RecordingSink;
    use crate::models::config::{CacheTtls, ChainClientConfig, StrategyConfig};
    use crate::models::errors::AppError;
    use crate::models::types::PoolVersion;
    use crate::providers::transport::mock::ScriptedTransport;
    use crate::utils::decoder::tests::{pair_created_log, v2_mint_log};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU64, Ordering};

    const FACTORY: u8 = 0xFA;
    const POOL_A: u8 = 0xA1;
    const POOL_B: u8 = 0xB2;

    fn block_of(params: &Value, key: &str) -> u64 {
        u64::from_str_radix(params[0][key].as_str().unwrap().trim_start_matches("0x"), 16).unwrap()
    }

    struct Harness {
        monitor: Monitor,
        transport: Arc<ScriptedTransport>,
        registry: PoolRegistry,
        engine: Arc<StrategyEngine>,
        sink: Arc<RecordingSink>,
    }

    fn harness(
        head: Arc<AtomicU64>,
        handler: impl Fn(&str, &Value) -> AppResult<Value> + Send + Sync + 'static,
        max_range: u64,
    ) -> Harness {
        let transport = Arc::new(ScriptedTransport::new(move |method, params| match method {
            "eth_blockNumber" => Ok(json!(format!("0x{:x}", head.load(Ordering::SeqCst)))),
            _ => handler(method, params),
        }));
        let mut chain = ChainClientConfig::new(vec!["http://a".into()]);
        chain.max_block_range = max_range;
        chain.ttls = CacheTtls {
            block_number: Duration::ZERO,
            logs: Duration::ZERO,
            call: Duration::ZERO,
            receipt: Duration::ZERO,
        };
        let client = Arc::new(ChainClient::new(chain, transport.clone()).unwrap());

        let registry = PoolRegistry::new();
        let engine = Arc::new(StrategyEngine::new(
            StrategyConfig::default(),
            registry.clone(),
            Arc::new(LexiconSentiment::new()),
            Arc::new(NullStore),
        ));
        let sink = Arc::new(RecordingSink::default());
        engine.register_sink(sink.clone());

        let mut config = MonitorConfig::default();
        config.factories = vec![FactoryConfig {
            address: Address::repeat_byte(FACTORY),
            version: PoolVersion::V2,
        }];
        config.classifier.quote_prices.clear();
        config.factory_interval = Duration::from_millis(10);
        config.pool_interval = Duration::from_millis(10);
        config.error_backoff = Duration::from_millis(10);

        let monitor = Monitor::new(client, registry.clone(), engine.clone(), Arc::new(NullStore), config);
        Harness {
            monitor,
            transport,
            registry,
            engine,
            sink,
        }
    }

    fn creation_logs(params: &Value) -> Vec<Value> {
        let from = block_of(params, "fromBlock");
        let to = block_of(params, "toBlock");
        // One pool created at block 50
        if (from..=to).contains(&50) {
            let log = pair_created_log(
                Address::repeat_byte(FACTORY),
                Address::repeat_byte(0x11),
                Address::repeat_byte(0x22),
                Address::repeat_byte(POOL_A),
                50,
            );
            vec![serde_json::to_value(log).unwrap()]
        } else {
            vec![]
        }
    }

    #[tokio::test]
    async fn test_factory_poll_registers_and_signals_once() {
        let head = Arc::new(AtomicU64::new(60));
        let h = harness(
            head,
            |method, params| match method {
                "eth_getLogs" => Ok(Value::Array(creation_logs(params))),
                _ => Err(AppError::rpc_error(-32000, "execution reverted")),
            },
            2_000,
        );
        let factory = h.monitor.config.factories[0].clone();

        let mut cursor = None;
        assert_eq!(h.monitor.poll_factory(&factory, &mut cursor).await.unwrap(), 1);
        assert_eq!(cursor, Some(60));

        let pool_addr = normalize_address(&Address::repeat_byte(POOL_A));
        let pool = h.registry.get(&pool_addr).unwrap();
        assert_eq!(pool.created_block, 50);
        // decimals() reverted: raw amounts downstream
        assert_eq!(pool.token0_decimals, None);
        assert_eq!(h.engine.active_count(&pool_addr).await, 1);

        // Replay the same range (crash before the cursor was persisted)
        let mut replay = Some(40);
        assert_eq!(h.monitor.poll_factory(&factory, &mut replay).await.unwrap(), 0);
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.engine.active_count(&pool_addr).await, 1);
    }

    #[tokio::test]
    async fn test_factory_poll_chunks_by_max_range() {
        let head = Arc::new(AtomicU64::new(350));
        let h = harness(
            head,
            |method, params| match method {
                "eth_getLogs" => Ok(Value::Array(creation_logs(params))),
                _ => Err(AppError::rpc_error(-32000, "execution reverted")),
            },
            100,
        );
        let factory = h.monitor.config.factories[0].clone();

        let mut cursor = Some(100);
        h.monitor.poll_factory(&factory, &mut cursor).await.unwrap();
        assert_eq!(cursor, Some(350));
        // [101,200] [201,300] [301,350]
        assert_eq!(h.transport.method_calls("eth_getLogs"), 3);
    }

    #[tokio::test]
    async fn test_cursor_holds_on_failed_batch() {
        let head = Arc::new(AtomicU64::new(60));
        let h = harness(
            head,
            |method, _| match method {
                "eth_getLogs" => Err(AppError::rpc_error(-32005, "query returned more than 10000 results")),
                _ => Err(AppError::rpc_error(-32000, "execution reverted")),
            },
            2_000,
        );
        let factory = h.monitor.config.factories[0].clone();

        let mut cursor = Some(10);
        assert!(h.monitor.poll_factory(&factory, &mut cursor).await.is_err());
        assert_eq!(cursor, Some(10));
    }

    #[tokio::test]
    async fn test_activity_isolates_pool_failures_and_moves_watermarks() {
        let head = Arc::new(AtomicU64::new(120));
        let pool_a = Address::repeat_byte(POOL_A);
        let pool_b = Address::repeat_byte(POOL_B);
        let pool_b_hex = normalize_address(&pool_b);
        let h = harness(
            head,
            move |method, params| match method {
                "eth_getLogs" => {
                    if params[0]["address"][0] == json!(pool_b_hex) {
                        return Err(AppError::rpc_error(-32000, "pool B is cursed"));
                    }
                    // Baseline mint then a 10x mint
                    let logs = vec![
                        v2_mint_log(pool_a, U256::from(100u64), U256::from(100u64), 101),
                        v2_mint_log(pool_a, U256::from(100u64), U256::from(100u64), 102),
                        v2_mint_log(pool_a, U256::from(1_000u64), U256::from(100u64), 103),
                    ];
                    Ok(serde_json::to_value(logs).unwrap())
                }
                _ => Err(AppError::rpc_error(-32000, "execution reverted")),
            },
            2_000,
        );

        let mut a = crate::core::registry::tests::pool(&normalize_address(&pool_a), 100);
        a.last_polled_block = Some(100);
        let mut b = crate::core::registry::tests::pool(&normalize_address(&pool_b), 100);
        b.last_polled_block = Some(100);
        h.registry.register(a);
        h.registry.register(b);

        let signals = h.monitor.poll_activity().await.unwrap();
        assert_eq!(signals, 1);
        assert_eq!(
            h.registry.get(&normalize_address(&pool_a)).unwrap().last_polled_block,
            Some(120)
        );
        assert_eq!(
            h.registry.get(&normalize_address(&pool_b)).unwrap().last_polled_block,
            Some(100)
        );
        assert_eq!(h.engine.get_stats().await.total_events, 3);
        assert_eq!(h.sink.count(), 0);
    }

    #[tokio::test]
    async fn test_loops_stop_on_shutdown() {
        let head = Arc::new(AtomicU64::new(60));
        let h = harness(
            head,
            |method, params| match method {
                "eth_getLogs" => Ok(Value::Array(creation_logs(params))),
                _ => Err(AppError::rpc_error(-32000, "execution reverted")),
            },
            2_000,
        );
        let registry = h.registry.clone();
        let (tx, rx) = watch::channel(false);
        let handles = Arc::new(h.monitor).spawn(rx);
        assert_eq!(handles.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("loop did not stop")
                .unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}
