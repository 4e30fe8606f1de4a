//! RPC Response Cache
//!
//! Thread-safe TTL cache in front of the chain client, keyed by the canonical
//! request signature (method + normalized params). Expired entries are evicted
//! lazily on read and in bulk by the background sweep.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cached JSON-RPC result with an absolute expiry
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

#[derive(Clone, Default)]
pub struct RpcCache {
    store: Arc<DashMap<String, CacheEntry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl RpcCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical key: method plus params with every string lowercased, so
    /// `0xABC` and `0xabc` hit the same entry.
    pub fn key(method: &str, params: &serde_json::Value) -> String {
        format!("{}:{}", method, normalize(params))
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if let Some(entry) = self.store.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.evict_if_expired(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 CACHE MISS (expired): {}", key);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "✅ CACHE HIT: {} (TTL: {}s remaining)",
                    key,
                    entry.remaining_ttl().as_secs()
                );
                Some(entry.value.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 CACHE MISS: {}", key);
            None
        }
    }

    /// Expiry is rechecked under the shard lock, so an entry refreshed by a
    /// concurrent `set` survives
    fn evict_if_expired(&self, key: &str) -> bool {
        self.store.remove_if(key, |_, entry| entry.is_expired()).is_some()
    }

    /// Insert or overwrite
    pub fn set(&self, key: String, value: serde_json::Value, ttl: Duration) {
        debug!("💾 CACHE SET: {} (TTL: {}s)", key, ttl.as_secs());
        self.store.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            info!("🧹 CACHE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn normalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(s.to_lowercase()),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(normalize).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), normalize(v))).collect(),
        ),
        other => other.clone(),
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} entries | {} hits | {} misses | {:.1}% hit rate",
            self.entries, self.hits, self.misses, self.hit_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_case_insensitive() {
        let a = RpcCache::key("eth_call", &json!([{"to": "0xABCD"}, "latest"]));
        let b = RpcCache::key("eth_call", &json!([{"to": "0xabcd"}, "latest"]));
        assert_eq!(a, b);
        assert_ne!(a, RpcCache::key("eth_getLogs", &json!([{"to": "0xabcd"}, "latest"])));
    }

    #[test]
    fn test_hit_before_ttl() {
        let cache = RpcCache::new();
        cache.set("k".into(), json!("0x10"), Duration::from_secs(10));
        assert_eq!(cache.get("k"), Some(json!("0x10")));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache = RpcCache::new();
        cache.set("k".into(), json!(1), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_eviction_spares_refreshed_entry() {
        let cache = RpcCache::new();
        cache.set("k".into(), json!(1), Duration::ZERO);
        cache.set("k".into(), json!(2), Duration::from_secs(60));
        assert!(!cache.evict_if_expired("k"));
        assert_eq!(cache.get("k"), Some(json!(2)));

        cache.set("k".into(), json!(3), Duration::ZERO);
        assert!(cache.evict_if_expired("k"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = RpcCache::new();
        cache.set("old".into(), json!(1), Duration::ZERO);
        cache.set("fresh".into(), json!(2), Duration::from_secs(60));
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
