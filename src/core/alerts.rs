//! Alert Sinks
//!
//! Registered delivery targets for fired alerts. The strategy engine invokes
//! every sink independently; a failing sink never blocks the others.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::models::errors::{AppError, AppResult};
use crate::models::types::{short_address, AlertPayload, Pool, SignalSummary, SignalType};
use crate::providers::transport::build_client;
use crate::utils::constants::EXPLORER_ADDRESS_URL;

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one alert. Retrying or dropping on failure is up to the sink.
    async fn notify(&self, alert: &AlertPayload) -> AppResult<()>;
}

/// Human-readable alert text
pub fn format_alert_message(
    pool_address: &str,
    pool: Option<&Pool>,
    signals: &BTreeMap<String, SignalSummary>,
    winning: SignalType,
    confidence: f64,
    sentiment: f64,
    recent_events: &[String],
) -> String {
    let summary: Vec<String> = SignalType::ALL
        .iter()
        .filter_map(|t| {
            signals
                .get(t.as_str())
                .map(|s| format!("{}{} x{}", t.emoji(), t.as_str(), s.count))
        })
        .collect();

    let mut message = format!("🚨 *POOL ALERT* 🚨\n\n📍 Pool: `{}`\n", pool_address);
    if let Some(pool) = pool {
        message.push_str(&format!(
            "💱 Pair: {} / {}\n🏷️ Version: {}",
            short_address(&pool.token0),
            short_address(&pool.token1),
            pool.version.as_str()
        ));
        if let Some(fee) = pool.fee_tier {
            message.push_str(&format!(" (Fee: {:.2}%)", fee as f64 / 10_000.0));
        }
        message.push('\n');
    }

    message.push_str(&format!(
        "\n🎯 Trigger: {}{} ({}/{} types seen)\n📶 Signals: {}\n📊 Confidence: {:.2} | 💬 Sentiment: {:+.2}",
        winning.emoji(),
        winning.as_str(),
        signals.len(),
        SignalType::ALL.len(),
        summary.join(" "),
        confidence,
        sentiment
    ));

    if !recent_events.is_empty() {
        message.push_str("\n\n🧾 Recent activity:");
        for event in recent_events {
            message.push_str(&format!("\n• {}", event));
        }
    }

    message.push_str(&format!(
        "\n\n[🔗 View on BaseScan]({}{})",
        EXPLORER_ADDRESS_URL, pool_address
    ));
    message
}

// ============================================
// LOG SINK
// ============================================

/// Writes alerts to the tracing output
#[derive(Debug, Clone, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &AlertPayload) -> AppResult<()> {
        info!(
            pool = %alert.record.pool_address,
            signal_type = alert.record.signal_type.as_str(),
            count = alert.record.signal_count,
            confidence = alert.record.confidence,
            "🚨 ALERT\n{}",
            alert.message
        );
        Ok(())
    }
}

// ============================================
// WEBHOOK SINK
// ============================================

/// POSTs the alert payload as JSON
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, alert: &AlertPayload) -> AppResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| AppError::sink_failed(self.name(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::sink_failed(
                self.name(),
                format!("HTTP error: {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::tests::pool;

    #[test]
    fn test_message_contains_pool_details() {
        let mut p = pool("0x00000000000000000000000000000000000000cc", 1);
        p.fee_tier = Some(3000);
        let mut signals = BTreeMap::new();
        signals.insert(
            "whale_buy".to_string(),
            SignalSummary {
                count: 3,
                avg_confidence: 0.85,
            },
        );
        signals.insert(
            "new_pool".to_string(),
            SignalSummary {
                count: 1,
                avg_confidence: 0.7,
            },
        );

        let message = format_alert_message(
            &p.address,
            Some(&p),
            &signals,
            SignalType::WhaleBuy,
            0.85,
            1.0,
            &["Large whale purchase of $120000 for 0x0000...00cc".to_string()],
        );

        assert!(message.contains("(Fee: 0.30%)"));
        assert!(message.contains("🐋whale_buy x3"));
        assert!(message.contains("🆕new_pool x1"));
        assert!(message.contains("(2/4 types seen)"));
        assert!(message.contains("https://basescan.org/address/0x00000000000000000000000000000000000000cc"));
        assert!(message.contains("• Large whale purchase"));
    }

    #[test]
    fn test_message_without_pool_metadata() {
        let message = format_alert_message(
            "0xabc",
            None,
            &BTreeMap::new(),
            SignalType::LiquiditySpike,
            0.8,
            0.0,
            &[],
        );
        assert!(message.contains("📍 Pool: `0xabc`"));
        assert!(!message.contains("Pair:"));
        assert!(!message.contains("Recent activity"));
    }
}
