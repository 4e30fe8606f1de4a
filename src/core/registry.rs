//! Pool Registry
//!
//! Set of known pools keyed by lowercase address. Only the monitor writes;
//! the strategy engine and the read API read concurrently.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::models::types::Pool;

#[derive(Clone, Default)]
pub struct PoolRegistry {
    pools: Arc<DashMap<String, Pool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert. Returns `false` when the address is already known.
    pub fn register(&self, mut pool: Pool) -> bool {
        pool.address = pool.address.to_lowercase();
        pool.token0 = pool.token0.to_lowercase();
        pool.token1 = pool.token1.to_lowercase();
        match self.pools.entry(pool.address.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(pool);
                true
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<Pool> {
        self.pools
            .get(&address.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.pools.contains_key(&address.to_lowercase())
    }

    /// Pools created at or after `block`, oldest first
    pub fn list_since(&self, block: u64) -> Vec<Pool> {
        let mut pools: Vec<Pool> = self
            .pools
            .iter()
            .filter(|entry| entry.created_block >= block)
            .map(|entry| entry.value().clone())
            .collect();
        pools.sort_by(|a, b| {
            a.created_block
                .cmp(&b.created_block)
                .then_with(|| a.address.cmp(&b.address))
        });
        pools
    }

    /// Pools young enough to keep polling at `current_block`
    pub fn list_active(&self, current_block: u64, max_age_blocks: u64) -> Vec<Pool> {
        self.list_since(current_block.saturating_sub(max_age_blocks))
    }

    /// Advance the activity watermark; never moves backwards
    pub fn set_watermark(&self, address: &str, block: u64) {
        if let Some(mut pool) = self.pools.get_mut(&address.to_lowercase()) {
            if pool.last_polled_block.map_or(true, |w| block > w) {
                pool.last_polled_block = Some(block);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::types::PoolVersion;
    use chrono::Utc;

    pub(crate) fn pool(address: &str, block: u64) -> Pool {
        Pool {
            address: address.to_string(),
            token0: "0x4200000000000000000000000000000000000006".into(),
            token1: "0x00000000000000000000000000000000000000aa".into(),
            fee_tier: None,
            version: PoolVersion::V2,
            factory: "0xfa".into(),
            created_block: block,
            created_at: Utc::now(),
            token0_decimals: None,
            token1_decimals: None,
            last_polled_block: None,
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = PoolRegistry::new();
        assert!(registry.register(pool("0xABC", 10)));
        assert!(!registry.register(pool("0xabc", 99)));
        assert_eq!(registry.len(), 1);
        // First write wins
        assert_eq!(registry.get("0xAbC").unwrap().created_block, 10);
    }

    #[test]
    fn test_list_since_is_ordered() {
        let registry = PoolRegistry::new();
        registry.register(pool("0x03", 30));
        registry.register(pool("0x01", 10));
        registry.register(pool("0x02", 20));

        let since: Vec<String> = registry.list_since(15).into_iter().map(|p| p.address).collect();
        assert_eq!(since, vec!["0x02", "0x03"]);
        assert_eq!(registry.list_active(40, 25).len(), 2);
    }

    #[test]
    fn test_watermark_is_monotonic() {
        let registry = PoolRegistry::new();
        registry.register(pool("0x01", 10));
        registry.set_watermark("0x01", 50);
        registry.set_watermark("0x01", 40);
        assert_eq!(registry.get("0x01").unwrap().last_polled_block, Some(50));
    }
}
