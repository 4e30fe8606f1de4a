//! Configuration module for Pool Sentry
//!
//! Every value is read from the environment and falls back to
//! `utils/constants.rs`. No hardcoded addresses or thresholds in this file.

use alloy_primitives::Address;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::models::errors::{AppError, AppResult};
use crate::models::types::{normalize_address, PoolVersion};
use crate::utils::constants::*;

/// A factory contract watched for pool creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryConfig {
    pub address: Address,
    pub version: PoolVersion,
}

/// Per-method cache lifetimes
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub block_number: Duration,
    pub logs: Duration,
    pub call: Duration,
    pub receipt: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            block_number: Duration::from_secs(BLOCK_NUMBER_TTL_SECS),
            logs: Duration::from_secs(LOGS_TTL_SECS),
            call: Duration::from_secs(CALL_TTL_SECS),
            receipt: Duration::from_secs(RECEIPT_TTL_SECS),
        }
    }
}

/// Chain client settings
#[derive(Debug, Clone)]
pub struct ChainClientConfig {
    pub endpoints: Vec<String>,
    pub request_timeout: Duration,
    pub dead_after: u32,
    pub cooldown: Duration,
    pub max_block_range: u64,
    pub ttls: CacheTtls,
}

impl ChainClientConfig {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            request_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            dead_after: ENDPOINT_DEAD_AFTER,
            cooldown: Duration::from_secs(DEFAULT_ENDPOINT_COOLDOWN_SECS),
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
            ttls: CacheTtls::default(),
        }
    }
}

/// Event classification thresholds
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub liquidity_spike_usd: f64,
    pub liquidity_spike_multiplier: f64,
    pub whale_buy_fraction: f64,
    pub whale_buy_usd: f64,
    /// Lowercase token address -> USD price
    pub quote_prices: HashMap<String, f64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            liquidity_spike_usd: DEFAULT_LIQUIDITY_SPIKE_USD,
            liquidity_spike_multiplier: DEFAULT_LIQUIDITY_SPIKE_MULTIPLIER,
            whale_buy_fraction: DEFAULT_WHALE_BUY_FRACTION,
            whale_buy_usd: DEFAULT_WHALE_BUY_USD,
            quote_prices: parse_quote_tokens(DEFAULT_QUOTE_TOKENS).unwrap_or_default(),
        }
    }
}

/// Polling loop settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub factories: Vec<FactoryConfig>,
    pub factory_interval: Duration,
    pub pool_interval: Duration,
    pub error_backoff: Duration,
    pub initial_lookback_blocks: u64,
    pub pool_max_age_blocks: u64,
    pub max_pools_per_cycle: usize,
    pub classifier: ClassifierConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            factories: default_factories(),
            factory_interval: Duration::from_secs(DEFAULT_FACTORY_POLL_SECS),
            pool_interval: Duration::from_secs(DEFAULT_POOL_POLL_SECS),
            error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECS),
            initial_lookback_blocks: DEFAULT_INITIAL_LOOKBACK_BLOCKS,
            pool_max_age_blocks: DEFAULT_POOL_MAX_AGE_BLOCKS,
            max_pools_per_cycle: DEFAULT_MAX_POOLS_PER_CYCLE,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Voting engine settings
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub vote_threshold: usize,
    pub voting_window: chrono::Duration,
    pub retention: chrono::Duration,
    pub history: chrono::Duration,
    pub sentiment_threshold: f64,
    pub confidence_gate: f64,
    pub sentiment_timeout: Duration,
    pub sink_timeout: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            vote_threshold: DEFAULT_VOTE_THRESHOLD,
            voting_window: chrono::Duration::seconds(DEFAULT_VOTING_WINDOW_SECS),
            retention: chrono::Duration::seconds(SIGNAL_RETENTION_SECS),
            history: chrono::Duration::seconds(SIGNAL_HISTORY_SECS),
            sentiment_threshold: DEFAULT_SENTIMENT_THRESHOLD,
            confidence_gate: ALERT_CONFIDENCE_GATE,
            sentiment_timeout: Duration::from_secs(SENTIMENT_TIMEOUT_SECS),
            sink_timeout: Duration::from_secs(SINK_TIMEOUT_SECS),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub chain: ChainClientConfig,
    pub monitor: MonitorConfig,
    pub strategy: StrategyConfig,
    pub api_bind: SocketAddr,
    pub store_dir: Option<PathBuf>,
    pub sentiment_url: Option<String>,
    pub alert_webhook_url: Option<String>,
}

impl SentryConfig {
    /// Load from environment variables. Zero RPC endpoints is fatal.
    pub fn from_env() -> AppResult<Self> {
        let endpoints: Vec<String> = std::env::var("RPC_URLS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if endpoints.is_empty() {
            return Err(AppError::no_endpoints_configured());
        }

        let chain = ChainClientConfig {
            endpoints,
            request_timeout: Duration::from_secs(env_parse(
                "RPC_TIMEOUT_SECS",
                DEFAULT_RPC_TIMEOUT_SECS,
            )?),
            dead_after: ENDPOINT_DEAD_AFTER,
            cooldown: Duration::from_secs(env_parse(
                "ENDPOINT_COOLDOWN_SECS",
                DEFAULT_ENDPOINT_COOLDOWN_SECS,
            )?),
            max_block_range: env_parse("MAX_BLOCK_RANGE", DEFAULT_MAX_BLOCK_RANGE)?,
            ttls: CacheTtls::default(),
        };
        if chain.max_block_range == 0 {
            return Err(AppError::invalid_config("MAX_BLOCK_RANGE", "0"));
        }

        let factories = vec![
            FactoryConfig {
                address: env_address("UNISWAP_V2_FACTORY", UNISWAP_V2_FACTORY_BASE)?,
                version: PoolVersion::V2,
            },
            FactoryConfig {
                address: env_address("UNISWAP_V3_FACTORY", UNISWAP_V3_FACTORY_BASE)?,
                version: PoolVersion::V3,
            },
        ];

        let quote_raw = std::env::var("QUOTE_TOKENS").unwrap_or_else(|_| DEFAULT_QUOTE_TOKENS.into());
        let classifier = ClassifierConfig {
            liquidity_spike_usd: env_parse("LIQUIDITY_SPIKE_USD", DEFAULT_LIQUIDITY_SPIKE_USD)?,
            liquidity_spike_multiplier: env_parse(
                "LIQUIDITY_SPIKE_MULTIPLIER",
                DEFAULT_LIQUIDITY_SPIKE_MULTIPLIER,
            )?,
            whale_buy_fraction: env_parse("WHALE_BUY_FRACTION", DEFAULT_WHALE_BUY_FRACTION)?,
            whale_buy_usd: env_parse("WHALE_BUY_USD", DEFAULT_WHALE_BUY_USD)?,
            quote_prices: parse_quote_tokens(&quote_raw)?,
        };

        let monitor = MonitorConfig {
            factories,
            factory_interval: Duration::from_secs(env_parse(
                "FACTORY_POLL_SECS",
                DEFAULT_FACTORY_POLL_SECS,
            )?),
            pool_interval: Duration::from_secs(env_parse("POOL_POLL_SECS", DEFAULT_POOL_POLL_SECS)?),
            error_backoff: Duration::from_secs(env_parse(
                "ERROR_BACKOFF_SECS",
                DEFAULT_ERROR_BACKOFF_SECS,
            )?),
            classifier,
            ..MonitorConfig::default()
        };

        let sentiment_threshold: f64 = env_parse("SENTIMENT_THRESHOLD", DEFAULT_SENTIMENT_THRESHOLD)?;
        if !(0.0..=1.0).contains(&sentiment_threshold) {
            return Err(AppError::invalid_config(
                "SENTIMENT_THRESHOLD",
                &sentiment_threshold.to_string(),
            ));
        }
        let vote_threshold: usize = env_parse("VOTE_THRESHOLD", DEFAULT_VOTE_THRESHOLD)?;
        if vote_threshold == 0 {
            return Err(AppError::invalid_config("VOTE_THRESHOLD", "0"));
        }

        let strategy = StrategyConfig {
            vote_threshold,
            voting_window: chrono::Duration::seconds(env_parse(
                "VOTING_WINDOW_SECS",
                DEFAULT_VOTING_WINDOW_SECS,
            )?),
            sentiment_threshold,
            ..StrategyConfig::default()
        };

        let api_bind_raw = std::env::var("API_BIND").unwrap_or_else(|_| DEFAULT_API_BIND.into());
        let api_bind = SocketAddr::from_str(&api_bind_raw)
            .map_err(|_| AppError::invalid_config("API_BIND", &api_bind_raw))?;

        let config = Self {
            chain,
            monitor,
            strategy,
            api_bind,
            store_dir: env_opt("STORE_DIR").map(PathBuf::from),
            sentiment_url: env_opt("SENTIMENT_URL"),
            alert_webhook_url: env_opt("ALERT_WEBHOOK_URL"),
        };

        info!(
            "⚙️ Config loaded: {} RPC endpoint(s), {} factories, N={}, window={}s",
            config.chain.endpoints.len(),
            config.monitor.factories.len(),
            config.strategy.vote_threshold,
            config.strategy.voting_window.num_seconds()
        );

        Ok(config)
    }
}

/// Base mainnet Uniswap factories
pub fn default_factories() -> Vec<FactoryConfig> {
    [
        (UNISWAP_V2_FACTORY_BASE, PoolVersion::V2),
        (UNISWAP_V3_FACTORY_BASE, PoolVersion::V3),
    ]
    .into_iter()
    .filter_map(|(addr, version)| {
        Address::from_str(addr)
            .ok()
            .map(|address| FactoryConfig { address, version })
    })
    .collect()
}

/// Parse `addr:price,addr:price` into a lowercase price table
pub fn parse_quote_tokens(raw: &str) -> AppResult<HashMap<String, f64>> {
    let mut prices = HashMap::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (addr, price) = item
            .split_once(':')
            .ok_or_else(|| AppError::invalid_config("QUOTE_TOKENS", item))?;
        let address =
            Address::from_str(addr.trim()).map_err(|_| AppError::invalid_config("QUOTE_TOKENS", item))?;
        let price: f64 = price
            .trim()
            .parse()
            .map_err(|_| AppError::invalid_config("QUOTE_TOKENS", item))?;
        if price <= 0.0 {
            return Err(AppError::invalid_config("QUOTE_TOKENS", item));
        }
        prices.insert(normalize_address(&address), price);
    }
    Ok(prices)
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(var: &str, default: T) -> AppResult<T> {
    match env_opt(var) {
        Some(raw) => raw.parse().map_err(|_| AppError::invalid_config(var, &raw)),
        None => Ok(default),
    }
}

fn env_address(var: &str, default: &str) -> AppResult<Address> {
    let raw = env_opt(var).unwrap_or_else(|| default.to_string());
    Address::from_str(&raw).map_err(|_| AppError::invalid_config(var, &raw))
}
