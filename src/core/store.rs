//! Persistence
//!
//! Fire-and-forget durability for pools, events, signals and alerts. Nothing in
//! the pipeline depends on a write succeeding; callers log failures and move on.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{AlertRecord, Pool, PoolEvent, Signal};

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save_pool(&self, pool: &Pool) -> AppResult<()>;
    async fn save_event(&self, event: &PoolEvent) -> AppResult<()>;
    async fn save_signal(&self, signal: &Signal) -> AppResult<()>;
    async fn save_alert(&self, alert: &AlertRecord) -> AppResult<()>;
}

/// Log a failed write; the pipeline never stops for persistence
pub fn log_store_error(what: &str, result: AppResult<()>) {
    if let Err(e) = result {
        warn!("💾 Failed to persist {}: {}", what, e);
    }
}

/// Discards everything
#[derive(Debug, Clone, Default)]
pub struct NullStore;

#[async_trait]
impl EventStore for NullStore {
    async fn save_pool(&self, _pool: &Pool) -> AppResult<()> {
        Ok(())
    }

    async fn save_event(&self, _event: &PoolEvent) -> AppResult<()> {
        Ok(())
    }

    async fn save_signal(&self, _signal: &Signal) -> AppResult<()> {
        Ok(())
    }

    async fn save_alert(&self, _alert: &AlertRecord) -> AppResult<()> {
        Ok(())
    }
}

/// Append-only JSON lines, one file per record kind
#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    pub async fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::with_source(
                ErrorCode::StoreWriteFailed,
                format!("cannot create store dir {}", dir.display()),
                e,
            )
        })?;
        info!("💾 JSONL store at {}", dir.display());
        Ok(Self { dir })
    }

    /// The file handle lives only for this call
    async fn append<T: Serialize + Sync>(&self, file: &str, record: &T) -> AppResult<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| AppError::store_failed(format!("serialize {}: {}", file, e)))?;
        line.push(b'\n');

        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await?;
        handle.write_all(&line).await?;
        handle.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for JsonlStore {
    async fn save_pool(&self, pool: &Pool) -> AppResult<()> {
        self.append("pools.jsonl", pool).await
    }

    async fn save_event(&self, event: &PoolEvent) -> AppResult<()> {
        self.append("events.jsonl", event).await
    }

    async fn save_signal(&self, signal: &Signal) -> AppResult<()> {
        self.append("signals.jsonl", signal).await
    }

    async fn save_alert(&self, alert: &AlertRecord) -> AppResult<()> {
        self.append("alerts.jsonl", alert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::tests::pool;
    use crate::models::types::SignalType;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pool_sentry_{}_{}", name, uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_jsonl_appends_one_line_per_record() {
        let dir = temp_dir("store");
        let store = JsonlStore::open(&dir).await.unwrap();

        store.save_pool(&pool("0x01", 1)).await.unwrap();
        store.save_pool(&pool("0x02", 2)).await.unwrap();
        store
            .save_signal(&Signal::new(SignalType::NewPool, "0x01", 0.7, serde_json::Value::Null))
            .await
            .unwrap();

        let pools = tokio::fs::read_to_string(dir.join("pools.jsonl")).await.unwrap();
        let lines: Vec<&str> = pools.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Pool = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.address, "0x01");

        let signals = tokio::fs::read_to_string(dir.join("signals.jsonl")).await.unwrap();
        assert!(signals.contains("\"new_pool\""));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_null_store_accepts_everything() {
        let store = NullStore;
        assert!(store.save_pool(&pool("0x01", 1)).await.is_ok());
    }
}
