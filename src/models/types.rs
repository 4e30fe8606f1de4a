//! Type definitions for Pool Sentry
//! All core data structures shared by the chain client, monitor and strategy engine

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lowercase `0x`-prefixed hex form used as the identity of pools and tokens
pub fn normalize_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

// ============================================
// CHAIN CLIENT
// ============================================

/// Liveness of a single RPC endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointHealth {
    Healthy,
    Degraded,
    Dead,
}

impl EndpointHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointHealth::Healthy => "HEALTHY",
            EndpointHealth::Degraded => "DEGRADED",
            EndpointHealth::Dead => "DEAD",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            EndpointHealth::Healthy => "✅",
            EndpointHealth::Degraded => "🟠",
            EndpointHealth::Dead => "💀",
        }
    }
}

/// Snapshot of one endpoint for operational tooling
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub url: String,
    pub health: EndpointHealth,
    pub consecutive_failures: u32,
    pub is_current: bool,
    /// Seconds left before a dead endpoint is retried
    pub retry_in_secs: Option<u64>,
}

/// Health transition of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointEvent {
    pub url: String,
    pub from: EndpointHealth,
    pub to: EndpointHealth,
}

/// eth_getLogs filter
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub addresses: Vec<Address>,
    /// Accepted topic0 values; empty means any
    pub topic0: Vec<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
            ..Default::default()
        }
    }

    pub fn address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn topics(mut self, topics: impl IntoIterator<Item = B256>) -> Self {
        self.topic0.extend(topics);
        self
    }

    /// Inclusive number of blocks covered
    pub fn span(&self) -> u64 {
        if self.to_block < self.from_block {
            0
        } else {
            self.to_block - self.from_block + 1
        }
    }

    /// JSON-RPC params with lowercase hex everywhere so equal filters share a cache key
    pub fn to_params(&self) -> serde_json::Value {
        let mut filter = serde_json::json!({
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
        });
        if !self.addresses.is_empty() {
            let addresses: Vec<String> = self.addresses.iter().map(normalize_address).collect();
            filter["address"] = serde_json::json!(addresses);
        }
        if !self.topic0.is_empty() {
            let topics: Vec<String> = self
                .topic0
                .iter()
                .map(|t| format!("0x{}", hex::encode(t)))
                .collect();
            filter["topics"] = serde_json::json!([topics]);
        }
        serde_json::json!([filter])
    }
}

/// Log as returned by eth_getLogs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<U64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<U64>,
    #[serde(default)]
    pub removed: bool,
}

impl RawLog {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }

    pub fn block(&self) -> u64 {
        self.block_number.map(|b| b.to::<u64>()).unwrap_or_default()
    }

    pub fn index(&self) -> u64 {
        self.log_index.map(|i| i.to::<u64>()).unwrap_or_default()
    }

    pub fn tx_hash(&self) -> String {
        self.transaction_hash
            .map(|h| format!("0x{}", hex::encode(h)))
            .unwrap_or_default()
    }
}

/// Minimal receipt view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<U64>,
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

// ============================================
// POOLS & EVENTS
// ============================================

/// Uniswap protocol version of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolVersion {
    V2,
    V3,
}

impl PoolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolVersion::V2 => "V2",
            PoolVersion::V3 => "V3",
        }
    }
}

/// A liquidity pool tracked by address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub address: String,
    pub token0: String,
    pub token1: String,
    /// Fee in hundredths of a bip (V3 only)
    pub fee_tier: Option<u32>,
    pub version: PoolVersion,
    pub factory: String,
    pub created_block: u64,
    pub created_at: DateTime<Utc>,
    pub token0_decimals: Option<u8>,
    pub token1_decimals: Option<u8>,
    /// Highest block whose activity has been processed
    pub last_polled_block: Option<u64>,
}

impl Pool {
    pub fn pair_label(&self) -> String {
        format!("{} / {}", short_address(&self.token0), short_address(&self.token1))
    }
}

/// `0x1234...abcd`
pub fn short_address(address: &str) -> String {
    if address.len() > 10 {
        format!("{}...{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

/// Token amount, decimal-aware when decimals are known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub raw: U256,
    pub decimals: Option<u8>,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: Option<u8>) -> Self {
        Self { raw, decimals }
    }

    /// Human units when decimals are known, raw integer value otherwise
    pub fn units(&self) -> f64 {
        let raw = u256_to_f64(self.raw);
        match self.decimals {
            Some(d) => raw / 10f64.powi(d as i32),
            None => raw,
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.decimals.is_some()
    }
}

/// Lossy U256 -> f64 over the full 256-bit range
pub fn u256_to_f64(value: U256) -> f64 {
    f64::from(value)
}

/// Decoded event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolEventKind {
    PairCreated {
        pair_index: u64,
    },
    PoolCreated {
        fee: u32,
        tick_spacing: i32,
    },
    Mint {
        sender: String,
        amount0: TokenAmount,
        amount1: TokenAmount,
    },
    Swap {
        sender: String,
        recipient: String,
        amount0_in: TokenAmount,
        amount1_in: TokenAmount,
        amount0_out: TokenAmount,
        amount1_out: TokenAmount,
    },
}

impl PoolEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            PoolEventKind::PairCreated { .. } => "PairCreated",
            PoolEventKind::PoolCreated { .. } => "PoolCreated",
            PoolEventKind::Mint { .. } => "Mint",
            PoolEventKind::Swap { .. } => "Swap",
        }
    }
}

/// One decoded on-chain log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEvent {
    pub kind: PoolEventKind,
    pub pool_address: String,
    pub token0: String,
    pub token1: String,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
}

impl PoolEvent {
    pub fn is_creation(&self) -> bool {
        matches!(
            self.kind,
            PoolEventKind::PairCreated { .. } | PoolEventKind::PoolCreated { .. }
        )
    }

    /// Short human sentence used for sentiment scoring and alert context.
    /// `notable` is set when the event produced a signal; only those are
    /// worded as whale or major liquidity activity.
    pub fn describe(&self, usd: Option<f64>, notable: bool) -> String {
        let pool = short_address(&self.pool_address);
        match (&self.kind, usd) {
            (PoolEventKind::PairCreated { .. }, _) => {
                format!("New trading pair created for {}", pool)
            }
            (PoolEventKind::PoolCreated { fee, .. }, _) => format!(
                "New liquidity pool launched for {} ({:.2}% fee)",
                pool,
                *fee as f64 / 10_000.0
            ),
            (PoolEventKind::Mint { .. }, Some(usd)) if notable => {
                format!("Major liquidity addition of ${:.0} for {}", usd, pool)
            }
            (PoolEventKind::Mint { .. }, Some(usd)) => {
                format!("Liquidity added to {} (${:.0})", pool, usd)
            }
            (PoolEventKind::Mint { amount0, amount1, .. }, None) => format!(
                "Liquidity added to {} ({:.4} / {:.4})",
                pool,
                amount0.units(),
                amount1.units()
            ),
            (PoolEventKind::Swap { .. }, Some(usd)) if notable => {
                format!("Large whale purchase of ${:.0} for {}", usd, pool)
            }
            (PoolEventKind::Swap { .. }, None) if notable => {
                format!("Large whale purchase in {}", pool)
            }
            (PoolEventKind::Swap { .. }, Some(usd)) => format!("Swap of ${:.0} in {}", usd, pool),
            (PoolEventKind::Swap { .. }, None) => format!("Swap executed in {}", pool),
        }
    }
}

// ============================================
// SIGNALS & ALERTS
// ============================================

/// Signal vocabulary. Declared in lexical order of the wire names so that
/// `Ord` gives the deterministic tie-break used by the voting engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    LiquiditySpike,
    NewPool,
    Sentiment,
    WhaleBuy,
}

impl SignalType {
    pub const ALL: [SignalType; 4] = [
        SignalType::LiquiditySpike,
        SignalType::NewPool,
        SignalType::Sentiment,
        SignalType::WhaleBuy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::LiquiditySpike => "liquidity_spike",
            SignalType::NewPool => "new_pool",
            SignalType::Sentiment => "sentiment",
            SignalType::WhaleBuy => "whale_buy",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            SignalType::LiquiditySpike => "📈",
            SignalType::NewPool => "🆕",
            SignalType::Sentiment => "💬",
            SignalType::WhaleBuy => "🐋",
        }
    }
}

/// A typed, confidence-scored piece of evidence about a pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub signal_type: SignalType,
    pub pool_address: String,
    /// In [0, 1]
    pub confidence: f64,
    pub source_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        signal_type: SignalType,
        pool_address: impl Into<String>,
        confidence: f64,
        source_data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signal_type,
            pool_address: pool_address.into().to_lowercase(),
            confidence: confidence.clamp(0.0, 1.0),
            source_data,
            created_at: Utc::now(),
        }
    }
}

/// Read-model of a signal for the command surface
#[derive(Debug, Clone, Serialize)]
pub struct SignalView {
    pub pool_address: String,
    pub token0: Option<String>,
    pub token1: Option<String>,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Active signals of one pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolSignals {
    pub pool_address: String,
    pub token0: Option<String>,
    pub token1: Option<String>,
    pub signals: Vec<SignalView>,
}

/// Per-type aggregate attached to an alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSummary {
    pub count: usize,
    pub avg_confidence: f64,
}

/// Persisted record of a fired alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub pool_address: String,
    pub signal_type: SignalType,
    pub signal_count: usize,
    pub confidence: f64,
    pub sentiment_score: f64,
    pub sentiment_confidence: f64,
    pub triggered_at: DateTime<Utc>,
}

/// Everything a sink needs to deliver an alert
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub record: AlertRecord,
    pub message: String,
    pub signals: BTreeMap<String, SignalSummary>,
    pub pool: Option<Pool>,
    pub recent_events: Vec<String>,
}

/// Engine-wide statistics for the read API
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub monitored_pools: usize,
    pub total_events: u64,
    pub total_signals: usize,
    pub recent_signals_last_hour: usize,
    pub active_pools_last_hour: usize,
    pub signal_breakdown: BTreeMap<String, usize>,
    pub total_alerts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_type_order_is_lexical() {
        let mut names: Vec<&str> = SignalType::ALL.iter().map(|t| t.as_str()).collect();
        let declared = names.clone();
        names.sort();
        assert_eq!(names, declared);
    }

    #[test]
    fn test_signal_type_serde_names() {
        let json = serde_json::to_string(&SignalType::WhaleBuy).unwrap();
        assert_eq!(json, "\"whale_buy\"");
    }

    #[test]
    fn test_token_amount_units() {
        let normalized = TokenAmount::new(U256::from(1_500_000u64), Some(6));
        assert!((normalized.units() - 1.5).abs() < 1e-12);

        let raw = TokenAmount::new(U256::from(1_500_000u64), None);
        assert_eq!(raw.units(), 1_500_000.0);
        assert!(!raw.is_normalized());
    }

    #[test]
    fn test_log_filter_span_and_params() {
        let filter = LogFilter::new(100, 199).address(Address::repeat_byte(0xAB));
        assert_eq!(filter.span(), 100);
        assert_eq!(LogFilter::new(10, 9).span(), 0);

        let params = filter.to_params();
        assert_eq!(params[0]["fromBlock"], "0x64");
        assert_eq!(params[0]["toBlock"], "0xc7");
        assert_eq!(
            params[0]["address"][0],
            "0xabababababababababababababababababababab"
        );
    }

    #[test]
    fn test_signal_clamps_confidence() {
        let signal = Signal::new(SignalType::NewPool, "0xABC", 1.7, serde_json::Value::Null);
        assert_eq!(signal.confidence, 1.0);
        assert_eq!(signal.pool_address, "0xabc");
    }

    #[test]
    fn test_u256_to_f64_covers_full_range() {
        let big = U256::from(u128::MAX) * U256::from(1_000u64);
        let ratio = u256_to_f64(big) / u256_to_f64(U256::from(u128::MAX));
        assert!((ratio - 1_000.0).abs() < 1e-6);
        assert!(u256_to_f64(U256::MAX) > 1e77);
    }

    #[test]
    fn test_describe_reserves_whale_wording_for_signals() {
        let swap = PoolEvent {
            kind: PoolEventKind::Swap {
                sender: "0x01".into(),
                recipient: "0x02".into(),
                amount0_in: TokenAmount::new(U256::ZERO, None),
                amount1_in: TokenAmount::new(U256::from(5u64), None),
                amount0_out: TokenAmount::new(U256::from(5u64), None),
                amount1_out: TokenAmount::new(U256::ZERO, None),
            },
            pool_address: "0x00000000000000000000000000000000000000cc".into(),
            token0: String::new(),
            token1: String::new(),
            block_number: 1,
            tx_hash: "0xtx".into(),
            log_index: 0,
        };
        assert_eq!(swap.describe(Some(5.0), false), "Swap of $5 in 0x0000...00cc");
        assert_eq!(
            swap.describe(Some(120_000.0), true),
            "Large whale purchase of $120000 for 0x0000...00cc"
        );
        assert_eq!(swap.describe(None, true), "Large whale purchase in 0x0000...00cc");
        assert_eq!(swap.kind.name(), "Swap");
    }

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("0x4200000000000000000000000000000000000006"),
            "0x4200...0006"
        );
        assert_eq!(short_address("0x12"), "0x12");
    }
}
