//! Core Module - Ingestion & Voting Pipeline
//!
//! Pool registry, polling monitor, event classifier, N-of-M strategy engine
//! and its external collaborators (sentiment, alert sinks, persistence).

pub mod alerts;
pub mod classifier;
pub mod monitor;
pub mod registry;
pub mod sentiment;
pub mod store;
pub mod strategy;

pub use alerts::*;
pub use classifier::*;
pub use monitor::*;
pub use registry::*;
pub use sentiment::*;
pub use store::*;
pub use strategy::*;
