//! Event Classifier
//! Turns decoded Mint/Swap events into liquidity_spike / whale_buy signals
//!
//! Two valuation paths:
//! - Priced pools (one side is a quote token with a known USD price) compare
//!   USD value against absolute thresholds.
//! - Unpriced pools compare a mint against the pool's running mint average and
//!   a swap against the pool's reserves.

use alloy_primitives::U256;
use dashmap::DashMap;
use serde_json::json;
use std::collections::HashSet;

use crate::models::config::ClassifierConfig;
use crate::models::types::{u256_to_f64, Pool, PoolEvent, PoolEventKind, Signal, SignalType, TokenAmount};
use crate::utils::constants::{
    LIQUIDITY_CONFIDENCE_CAP, LIQUIDITY_CONFIDENCE_USD_SCALE, WHALE_CONFIDENCE_CAP,
    WHALE_CONFIDENCE_USD_SCALE,
};

/// Outcome of classifying one event
#[derive(Debug, Clone)]
pub struct Classification {
    pub signal: Option<Signal>,
    /// Estimated USD value when the pool is priced
    pub usd: Option<f64>,
}

impl Classification {
    fn none(usd: Option<f64>) -> Self {
        Self { signal: None, usd }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MintStats {
    count: u64,
    total0: f64,
    total1: f64,
}

pub struct Classifier {
    config: ClassifierConfig,
    mint_stats: DashMap<String, MintStats>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            mint_stats: DashMap::new(),
        }
    }

    fn price_of(&self, token: &str, amount: &TokenAmount) -> Option<f64> {
        // Raw integer amounts cannot be priced
        if !amount.is_normalized() {
            return None;
        }
        self.config.quote_prices.get(token).copied()
    }

    pub fn classify(&self, pool: &Pool, event: &PoolEvent, reserves: Option<(U256, U256)>) -> Classification {
        match &event.kind {
            PoolEventKind::Mint { amount0, amount1, .. } => self.classify_mint(pool, event, amount0, amount1),
            PoolEventKind::Swap {
                amount0_in,
                amount1_in,
                amount0_out,
                amount1_out,
                ..
            } => {
                let side0 = larger(amount0_in, amount0_out);
                let side1 = larger(amount1_in, amount1_out);
                self.classify_swap(pool, event, &side0, &side1, reserves)
            }
            PoolEventKind::PairCreated { .. } | PoolEventKind::PoolCreated { .. } => {
                Classification::none(None)
            }
        }
    }

    // ============================================
    // LIQUIDITY SPIKE
    // ============================================

    fn classify_mint(
        &self,
        pool: &Pool,
        event: &PoolEvent,
        amount0: &TokenAmount,
        amount1: &TokenAmount,
    ) -> Classification {
        // Both sides of a mint carry equal value, so double the priced one
        let usd = self
            .price_of(&pool.token0, amount0)
            .map(|p| amount0.units() * p * 2.0)
            .or_else(|| self.price_of(&pool.token1, amount1).map(|p| amount1.units() * p * 2.0));

        let ratio = self.observe_mint(&pool.address, amount0.units(), amount1.units());

        let confidence = match usd {
            Some(usd) if usd >= self.config.liquidity_spike_usd => Some(liquidity_confidence_usd(usd)),
            Some(_) => None,
            None => ratio
                .filter(|r| *r >= self.config.liquidity_spike_multiplier)
                .map(|r| liquidity_confidence_ratio(r, self.config.liquidity_spike_multiplier)),
        };

        let signal = confidence.map(|confidence| {
            Signal::new(
                SignalType::LiquiditySpike,
                &pool.address,
                confidence,
                json!({
                    "event": "Mint",
                    "usd": usd,
                    "ratio_to_average": ratio,
                    "amount0": amount0.units(),
                    "amount1": amount1.units(),
                    "block": event.block_number,
                    "tx": event.tx_hash,
                }),
            )
        });
        Classification { signal, usd }
    }

    /// Forget the mint baselines of pools outside `active`
    pub fn retain_pools(&self, active: &HashSet<String>) {
        self.mint_stats.retain(|pool, _| active.contains(pool));
    }

    #[cfg(test)]
    fn tracked_pools(&self) -> usize {
        self.mint_stats.len()
    }

    /// Record a mint; returns its size relative to the previous average (larger side)
    fn observe_mint(&self, pool: &str, amount0: f64, amount1: f64) -> Option<f64> {
        let mut stats = self.mint_stats.entry(pool.to_string()).or_default();
        let ratio = if stats.count == 0 {
            None
        } else {
            let n = stats.count as f64;
            let r0 = ratio_to(amount0, stats.total0 / n);
            let r1 = ratio_to(amount1, stats.total1 / n);
            Some(r0.max(r1))
        };
        stats.count += 1;
        stats.total0 += amount0;
        stats.total1 += amount1;
        ratio
    }

    // ============================================
    // WHALE BUY
    // ============================================

    fn classify_swap(
        &self,
        pool: &Pool,
        event: &PoolEvent,
        side0: &TokenAmount,
        side1: &TokenAmount,
        reserves: Option<(U256, U256)>,
    ) -> Classification {
        let usd = self
            .price_of(&pool.token0, side0)
            .map(|p| side0.units() * p)
            .or_else(|| self.price_of(&pool.token1, side1).map(|p| side1.units() * p));

        // Same token on both sides of the ratio, so decimals cancel out
        let fraction = reserves.map(|(r0, r1)| {
            fraction_of(side0.raw, r0).max(fraction_of(side1.raw, r1))
        });

        let by_usd = usd
            .filter(|u| *u >= self.config.whale_buy_usd)
            .map(whale_confidence_usd);
        let by_fraction = fraction
            .filter(|f| *f >= self.config.whale_buy_fraction)
            .map(whale_confidence_fraction);

        let confidence = match (by_usd, by_fraction) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let signal = confidence.map(|confidence| {
            Signal::new(
                SignalType::WhaleBuy,
                &pool.address,
                confidence,
                json!({
                    "event": "Swap",
                    "usd": usd,
                    "reserve_fraction": fraction,
                    "amount0": side0.units(),
                    "amount1": side1.units(),
                    "block": event.block_number,
                    "tx": event.tx_hash,
                }),
            )
        });
        Classification { signal, usd }
    }
}

fn larger(a: &TokenAmount, b: &TokenAmount) -> TokenAmount {
    if a.raw >= b.raw {
        *a
    } else {
        *b
    }
}

fn ratio_to(value: f64, average: f64) -> f64 {
    if average > 0.0 {
        value / average
    } else {
        0.0
    }
}

fn fraction_of(amount: U256, reserve: U256) -> f64 {
    if reserve.is_zero() {
        0.0
    } else {
        u256_to_f64(amount) / u256_to_f64(reserve)
    }
}

pub fn liquidity_confidence_usd(usd: f64) -> f64 {
    (0.5 + usd / LIQUIDITY_CONFIDENCE_USD_SCALE).min(LIQUIDITY_CONFIDENCE_CAP)
}

pub fn liquidity_confidence_ratio(ratio: f64, multiplier: f64) -> f64 {
    (0.5 + 0.1 * ratio / multiplier).min(LIQUIDITY_CONFIDENCE_CAP)
}

pub fn whale_confidence_usd(usd: f64) -> f64 {
    (0.6 + usd / WHALE_CONFIDENCE_USD_SCALE).min(WHALE_CONFIDENCE_CAP)
}

pub fn whale_confidence_fraction(fraction: f64) -> f64 {
    (0.6 + fraction * 2.0).min(WHALE_CONFIDENCE_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::tests::pool;
    use crate::utils::constants::WETH_BASE;

    fn weth(units: u64) -> TokenAmount {
        TokenAmount::new(U256::from(units) * U256::from(10u64).pow(U256::from(18u64)), Some(18))
    }

    fn raw(value: u64) -> TokenAmount {
        TokenAmount::new(U256::from(value), None)
    }

    fn mint(pool_address: &str, amount0: TokenAmount, amount1: TokenAmount) -> PoolEvent {
        PoolEvent {
            kind: PoolEventKind::Mint {
                sender: "0x01".into(),
                amount0,
                amount1,
            },
            pool_address: pool_address.into(),
            token0: WETH_BASE.into(),
            token1: "0xaa".into(),
            block_number: 5,
            tx_hash: "0xtx".into(),
            log_index: 0,
        }
    }

    fn swap(pool_address: &str, amount0_out: TokenAmount, amount1_in: TokenAmount) -> PoolEvent {
        PoolEvent {
            kind: PoolEventKind::Swap {
                sender: "0x01".into(),
                recipient: "0x02".into(),
                amount0_in: TokenAmount::new(U256::ZERO, amount0_out.decimals),
                amount1_in,
                amount0_out,
                amount1_out: TokenAmount::new(U256::ZERO, amount1_in.decimals),
            },
            pool_address: pool_address.into(),
            token0: WETH_BASE.into(),
            token1: "0xaa".into(),
            block_number: 6,
            tx_hash: "0xtx".into(),
            log_index: 1,
        }
    }

    #[test]
    fn test_confidence_formulas() {
        assert!((liquidity_confidence_usd(50_000.0) - 0.7).abs() < 1e-9);
        assert_eq!(liquidity_confidence_usd(10_000_000.0), 0.9);
        assert!((whale_confidence_usd(100_000.0) - 0.85).abs() < 1e-9);
        assert_eq!(whale_confidence_usd(10_000_000.0), 0.95);
        assert!((whale_confidence_fraction(0.05) - 0.7).abs() < 1e-9);
        assert!((liquidity_confidence_ratio(10.0, 5.0) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_priced_mint_above_threshold_is_spike() {
        let classifier = Classifier::new(ClassifierConfig::default());
        let p = pool("0xp1", 1);
        // 5 WETH at $3000, doubled = $30k
        let result = classifier.classify(&p, &mint("0xp1", weth(5), raw(1)), None);
        assert_eq!(result.usd, Some(30_000.0));
        let signal = result.signal.unwrap();
        assert_eq!(signal.signal_type, SignalType::LiquiditySpike);
        assert!((signal.confidence - 0.62).abs() < 1e-9);
    }

    #[test]
    fn test_priced_mint_below_threshold_is_quiet() {
        let classifier = Classifier::new(ClassifierConfig::default());
        let p = pool("0xp1", 1);
        let result = classifier.classify(&p, &mint("0xp1", weth(1), raw(1)), None);
        assert_eq!(result.usd, Some(6_000.0));
        assert!(result.signal.is_none());
    }

    #[test]
    fn test_unpriced_mint_uses_running_average() {
        let mut config = ClassifierConfig::default();
        config.quote_prices.clear();
        let classifier = Classifier::new(config);
        let p = pool("0xp2", 1);

        // No baseline yet
        assert!(classifier.classify(&p, &mint("0xp2", raw(100), raw(100)), None).signal.is_none());
        // 2x average: below the 5x multiplier
        assert!(classifier.classify(&p, &mint("0xp2", raw(200), raw(100)), None).signal.is_none());
        // Average is now 150 -> 1500 is 10x
        let signal = classifier
            .classify(&p, &mint("0xp2", raw(1_500), raw(100)), None)
            .signal
            .unwrap();
        assert!((signal.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_retain_pools_drops_stale_baselines() {
        let mut config = ClassifierConfig::default();
        config.quote_prices.clear();
        let classifier = Classifier::new(config);
        classifier.classify(&pool("0xp3", 1), &mint("0xp3", raw(100), raw(100)), None);
        classifier.classify(&pool("0xp4", 1), &mint("0xp4", raw(100), raw(100)), None);
        assert_eq!(classifier.tracked_pools(), 2);

        classifier.retain_pools(&HashSet::from(["0xp4".to_string()]));
        assert_eq!(classifier.tracked_pools(), 1);

        // 0xp3 starts over without a baseline
        assert!(classifier
            .classify(&pool("0xp3", 1), &mint("0xp3", raw(10_000), raw(100)), None)
            .signal
            .is_none());
    }

    #[test]
    fn test_whale_by_usd_floor() {
        let classifier = Classifier::new(ClassifierConfig::default());
        let p = pool("0xp3", 1);
        // 40 WETH bought = $120k
        let result = classifier.classify(&p, &swap("0xp3", weth(40), raw(1)), None);
        let signal = result.signal.unwrap();
        assert_eq!(signal.signal_type, SignalType::WhaleBuy);
        assert!((signal.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_whale_by_reserve_fraction() {
        let mut config = ClassifierConfig::default();
        config.quote_prices.clear();
        let classifier = Classifier::new(config);
        let p = pool("0xp4", 1);

        let reserves = Some((U256::from(1_000_000u64), U256::from(1_000_000u64)));
        // 1% of reserve1 swapped in
        let result = classifier.classify(&p, &swap("0xp4", raw(10), raw(10_000)), reserves);
        let signal = result.signal.unwrap();
        assert!((signal.confidence - 0.62).abs() < 1e-9);

        // 0.1% stays quiet
        let quiet = classifier.classify(&p, &swap("0xp4", raw(10), raw(1_000)), reserves);
        assert!(quiet.signal.is_none());
    }

    #[test]
    fn test_small_swap_without_reserves_is_quiet() {
        let classifier = Classifier::new(ClassifierConfig::default());
        let p = pool("0xp5", 1);
        assert!(classifier.classify(&p, &swap("0xp5", weth(1), raw(1)), None).signal.is_none());
    }
}
