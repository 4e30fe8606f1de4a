//! Constants Module - Single Source of Truth
//!
//! Every default the configuration layer falls back to lives here:
//! factory addresses, cache TTLs, polling intervals and voting thresholds.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "PoolSentry";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for outbound HTTP requests
pub const USER_AGENT: &str = "PoolSentry/0.1.0";

// ============================================
// CHAIN
// ============================================

/// Base mainnet
pub const CHAIN_ID_BASE: u64 = 8453;

/// Uniswap V2 factory on Base
pub const UNISWAP_V2_FACTORY_BASE: &str = "0x8909dc15e40953b386fa8f440db7f0dda8221820";

/// Uniswap V3 factory on Base
pub const UNISWAP_V3_FACTORY_BASE: &str = "0x33128a8fc17869897dce68ed026d694621f6fdad";

/// WETH on Base (OP-stack predeploy)
pub const WETH_BASE: &str = "0x4200000000000000000000000000000000000006";

/// Native USDC on Base
pub const USDC_BASE: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";

/// Default quote-token price table: `address:usd_price`
pub const DEFAULT_QUOTE_TOKENS: &str =
    "0x4200000000000000000000000000000000000006:3000,0x833589fcd6edb6e08f4c7c32d4f71b54bda02913:1";

/// Block explorer used in alert messages
pub const EXPLORER_ADDRESS_URL: &str = "https://basescan.org/address/";

// ============================================
// RPC CONSTANTS
// ============================================

/// Default timeout for RPC requests (seconds)
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;

/// Consecutive degradations before an endpoint is considered dead
pub const ENDPOINT_DEAD_AFTER: u32 = 3;

/// Cool-down before a dead endpoint is retried (seconds)
pub const DEFAULT_ENDPOINT_COOLDOWN_SECS: u64 = 300;

/// Largest block span a single eth_getLogs query may cover
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 2_000;

/// Cache TTL for eth_blockNumber (seconds)
pub const BLOCK_NUMBER_TTL_SECS: u64 = 10;

/// Cache TTL for eth_getLogs (seconds)
pub const LOGS_TTL_SECS: u64 = 60;

/// Cache TTL for eth_call (seconds)
pub const CALL_TTL_SECS: u64 = 60;

/// Cache TTL for transaction receipts (seconds); mined receipts do not change
pub const RECEIPT_TTL_SECS: u64 = 300;

/// Interval of the background cache sweep (seconds)
pub const CACHE_SWEEP_SECS: u64 = 60;

// ============================================
// MONITOR CONSTANTS
// ============================================

/// Factory polling interval (seconds)
pub const DEFAULT_FACTORY_POLL_SECS: u64 = 30;

/// Pool activity polling interval (seconds)
pub const DEFAULT_POOL_POLL_SECS: u64 = 15;

/// Back-off after a failed loop iteration (seconds)
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 15;

/// How far back the factory loops look on first start (blocks)
pub const DEFAULT_INITIAL_LOOKBACK_BLOCKS: u64 = 100;

/// Pools older than this stop being polled for activity (blocks, ~1h on Base)
pub const DEFAULT_POOL_MAX_AGE_BLOCKS: u64 = 1_800;

/// Upper bound of pools polled per activity cycle
pub const DEFAULT_MAX_POOLS_PER_CYCLE: usize = 50;

/// Confidence of a synthesized new_pool signal
pub const NEW_POOL_CONFIDENCE: f64 = 0.7;

/// Liquidity spike: absolute USD threshold
pub const DEFAULT_LIQUIDITY_SPIKE_USD: f64 = 10_000.0;

/// Liquidity spike: multiple of the pool's running mint average (unpriced pools)
pub const DEFAULT_LIQUIDITY_SPIKE_MULTIPLIER: f64 = 5.0;

/// Whale buy: fraction of the pool's reserve of the traded token
pub const DEFAULT_WHALE_BUY_FRACTION: f64 = 0.005;

/// Whale buy: absolute USD floor
pub const DEFAULT_WHALE_BUY_USD: f64 = 50_000.0;

/// Liquidity spike confidence: `0.5 + usd / scale`, capped at 0.9
pub const LIQUIDITY_CONFIDENCE_USD_SCALE: f64 = 250_000.0;
pub const LIQUIDITY_CONFIDENCE_CAP: f64 = 0.9;

/// Whale buy confidence: `0.6 + usd / scale`, capped at 0.95
pub const WHALE_CONFIDENCE_USD_SCALE: f64 = 400_000.0;
pub const WHALE_CONFIDENCE_CAP: f64 = 0.95;

// ============================================
// STRATEGY CONSTANTS
// ============================================

/// Signals of one type needed to vote for an alert
pub const DEFAULT_VOTE_THRESHOLD: usize = 3;

/// Voting window (seconds)
pub const DEFAULT_VOTING_WINDOW_SECS: i64 = 30 * 60;

/// Active signal retention (seconds)
pub const SIGNAL_RETENTION_SECS: i64 = 60 * 60;

/// Display history retention (seconds)
pub const SIGNAL_HISTORY_SECS: i64 = 24 * 60 * 60;

/// Sentiment polarity that passes the gate on its own
pub const DEFAULT_SENTIMENT_THRESHOLD: f64 = 0.6;

/// Overall confidence that passes the gate on its own
pub const ALERT_CONFIDENCE_GATE: f64 = 0.8;

/// Ceiling of the overall confidence
pub const OVERALL_CONFIDENCE_CAP: f64 = 0.95;

/// Weight of sentiment confidence in the overall confidence
pub const SENTIMENT_WEIGHT: f64 = 0.3;

/// Sentiment capability timeout (seconds)
pub const SENTIMENT_TIMEOUT_SECS: u64 = 5;

/// Per-sink delivery timeout (seconds)
pub const SINK_TIMEOUT_SECS: u64 = 10;

/// Event descriptions kept per pool
pub const MAX_EVENTS_PER_POOL: usize = 50;

/// Raw events attached to an alert for human context
pub const ALERT_CONTEXT_EVENTS: usize = 5;

/// Alerts kept for the read API
pub const MAX_RECENT_ALERTS: usize = 100;

/// Signals kept in the display history
pub const MAX_SIGNAL_HISTORY: usize = 10_000;

// ============================================
// API
// ============================================

/// Default bind address of the read API
pub const DEFAULT_API_BIND: &str = "0.0.0.0:8080";

/// Concurrent requests served by the read API
pub const API_CONCURRENCY_LIMIT: usize = 64;

/// Page size when `limit` is omitted
pub const DEFAULT_API_PAGE: usize = 50;

/// Largest accepted `limit`
pub const MAX_API_PAGE: usize = 1_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_are_lowercase() {
        for addr in [UNISWAP_V2_FACTORY_BASE, UNISWAP_V3_FACTORY_BASE, WETH_BASE, USDC_BASE] {
            assert_eq!(addr, addr.to_lowercase());
            assert_eq!(addr.len(), 42);
        }
    }

    #[test]
    fn test_ttl_ordering() {
        assert!(BLOCK_NUMBER_TTL_SECS < LOGS_TTL_SECS);
        assert!(DEFAULT_VOTING_WINDOW_SECS <= SIGNAL_RETENTION_SECS);
        assert!(SIGNAL_RETENTION_SECS <= SIGNAL_HISTORY_SECS);
    }
}
