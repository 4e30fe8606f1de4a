//! Pool Sentry Library
//!
//! Watches Uniswap V2/V3 factories on Base for new pools, follows their early
//! liquidity and swap activity, and raises an alert once enough independent
//! signals agree on a pool:
//! - Resilient multi-endpoint JSON-RPC client with failover and a TTL cache
//! - Factory and pool-activity polling loops
//! - N-of-M signal voting with sentiment weighting and pluggable alert sinks

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{
    AlertSink, Classifier, EventStore, JsonlStore, LexiconSentiment, LogSink, Monitor,
    NullStore, PoolRegistry, SentimentAnalyzer, StrategyEngine, WebhookSink,
};
pub use models::{AppError, AppResult, ErrorCode, SentryConfig};
pub use providers::{ChainClient, HttpTransport, RpcTransport};
