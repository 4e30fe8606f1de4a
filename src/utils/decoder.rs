//! Event decoder module
//! Maps raw Uniswap V2/V3 logs onto the tagged `PoolEventKind` union.
//!
//! Stateless: pool metadata needed for activity logs (token pair, decimals)
//! is passed in by the caller.

use alloy_primitives::{Signed, B256, U256};
use alloy_sol_types::{sol, SolEvent};
use chrono::Utc;
use tracing::debug;

use crate::models::errors::{AppError, AppResult};
use crate::models::types::{
    normalize_address, Pool, PoolEvent, PoolEventKind, PoolVersion, RawLog, TokenAmount,
};

/// Uniswap V2 factory and pair events
pub mod v2 {
    use super::sol;

    sol! {
        event PairCreated(address indexed token0, address indexed token1, address pair, uint256 allPairsLength);
        event Mint(address indexed sender, uint256 amount0, uint256 amount1);
        event Swap(
            address indexed sender,
            uint256 amount0In,
            uint256 amount1In,
            uint256 amount0Out,
            uint256 amount1Out,
            address indexed to
        );
    }
}

/// Uniswap V3 factory and pool events
pub mod v3 {
    use super::sol;

    sol! {
        event PoolCreated(address indexed token0, address indexed token1, uint24 indexed fee, int24 tickSpacing, address pool);
        event Mint(
            address sender,
            address indexed owner,
            int24 indexed tickLower,
            int24 indexed tickUpper,
            uint128 amount,
            uint256 amount0,
            uint256 amount1
        );
        event Swap(
            address indexed sender,
            address indexed recipient,
            int256 amount0,
            int256 amount1,
            uint160 sqrtPriceX96,
            uint128 liquidity,
            int24 tick
        );
    }
}

/// topic0 values emitted by factories
pub fn creation_topics() -> Vec<B256> {
    vec![v2::PairCreated::SIGNATURE_HASH, v3::PoolCreated::SIGNATURE_HASH]
}

/// topic0 values emitted by pools
pub fn activity_topics() -> Vec<B256> {
    vec![
        v2::Mint::SIGNATURE_HASH,
        v2::Swap::SIGNATURE_HASH,
        v3::Mint::SIGNATURE_HASH,
        v3::Swap::SIGNATURE_HASH,
    ]
}

/// Decode one log.
///
/// Returns `Ok(None)` for unrecognized topics and removed (reorged) logs,
/// `Err(DecodeFailed)` when the topic is known but the payload does not fit.
pub fn decode_log(log: &RawLog, pool: Option<&Pool>) -> AppResult<Option<PoolEvent>> {
    if log.removed {
        debug!("↩️ Skipping removed log in tx {}", log.tx_hash());
        return Ok(None);
    }
    let Some(topic0) = log.topic0().copied() else {
        return Ok(None);
    };

    let emitter = normalize_address(&log.address);
    let (token0, token1) = pool
        .map(|p| (p.token0.clone(), p.token1.clone()))
        .unwrap_or_default();
    let (dec0, dec1) = pool
        .map(|p| (p.token0_decimals, p.token1_decimals))
        .unwrap_or_default();
    let amount0 = |raw: U256| TokenAmount::new(raw, dec0);
    let amount1 = |raw: U256| TokenAmount::new(raw, dec1);

    let (kind, pool_address, token0, token1) = if topic0 == v2::PairCreated::SIGNATURE_HASH {
        let ev = decode_as::<v2::PairCreated>(log)?;
        (
            PoolEventKind::PairCreated {
                pair_index: ev.allPairsLength.try_into().unwrap_or(u64::MAX),
            },
            normalize_address(&ev.pair),
            normalize_address(&ev.token0),
            normalize_address(&ev.token1),
        )
    } else if topic0 == v3::PoolCreated::SIGNATURE_HASH {
        let ev = decode_as::<v3::PoolCreated>(log)?;
        (
            PoolEventKind::PoolCreated {
                fee: ev.fee.to::<u32>(),
                tick_spacing: i32::try_from(ev.tickSpacing).unwrap_or_default(),
            },
            normalize_address(&ev.pool),
            normalize_address(&ev.token0),
            normalize_address(&ev.token1),
        )
    } else if topic0 == v2::Mint::SIGNATURE_HASH {
        let ev = decode_as::<v2::Mint>(log)?;
        (
            PoolEventKind::Mint {
                sender: normalize_address(&ev.sender),
                amount0: amount0(ev.amount0),
                amount1: amount1(ev.amount1),
            },
            emitter,
            token0,
            token1,
        )
    } else if topic0 == v3::Mint::SIGNATURE_HASH {
        let ev = decode_as::<v3::Mint>(log)?;
        (
            PoolEventKind::Mint {
                sender: normalize_address(&ev.sender),
                amount0: amount0(ev.amount0),
                amount1: amount1(ev.amount1),
            },
            emitter,
            token0,
            token1,
        )
    } else if topic0 == v2::Swap::SIGNATURE_HASH {
        let ev = decode_as::<v2::Swap>(log)?;
        (
            PoolEventKind::Swap {
                sender: normalize_address(&ev.sender),
                recipient: normalize_address(&ev.to),
                amount0_in: amount0(ev.amount0In),
                amount1_in: amount1(ev.amount1In),
                amount0_out: amount0(ev.amount0Out),
                amount1_out: amount1(ev.amount1Out),
            },
            emitter,
            token0,
            token1,
        )
    } else if topic0 == v3::Swap::SIGNATURE_HASH {
        let ev = decode_as::<v3::Swap>(log)?;
        // Positive deltas flowed into the pool, negative ones out of it
        let (in0, out0) = split_delta(ev.amount0);
        let (in1, out1) = split_delta(ev.amount1);
        (
            PoolEventKind::Swap {
                sender: normalize_address(&ev.sender),
                recipient: normalize_address(&ev.recipient),
                amount0_in: amount0(in0),
                amount1_in: amount1(in1),
                amount0_out: amount0(out0),
                amount1_out: amount1(out1),
            },
            emitter,
            token0,
            token1,
        )
    } else {
        return Ok(None);
    };

    Ok(Some(PoolEvent {
        kind,
        pool_address,
        token0,
        token1,
        block_number: log.block(),
        tx_hash: log.tx_hash(),
        log_index: log.index(),
    }))
}

fn decode_as<E: SolEvent>(log: &RawLog) -> AppResult<E> {
    E::decode_raw_log(log.topics.iter().copied(), &log.data, true).map_err(|e| {
        AppError::decode_failed(format!(
            "{} at {} (tx {}): {}",
            E::SIGNATURE,
            normalize_address(&log.address),
            log.tx_hash(),
            e
        ))
    })
}

fn split_delta(delta: Signed<256, 4>) -> (U256, U256) {
    if delta.is_negative() {
        (U256::ZERO, delta.unsigned_abs())
    } else {
        (delta.unsigned_abs(), U256::ZERO)
    }
}

/// Build the registry record for a creation event
pub fn pool_from_creation(event: &PoolEvent, factory: &str) -> Option<Pool> {
    let (version, fee_tier) = match event.kind {
        PoolEventKind::PairCreated { .. } => (PoolVersion::V2, None),
        PoolEventKind::PoolCreated { fee, .. } => (PoolVersion::V3, Some(fee)),
        _ => return None,
    };
    Some(Pool {
        address: event.pool_address.clone(),
        token0: event.token0.clone(),
        token1: event.token1.clone(),
        fee_tier,
        version,
        factory: factory.to_lowercase(),
        created_block: event.block_number,
        created_at: Utc::now(),
        token0_decimals: None,
        token1_decimals: None,
        last_polled_block: None,
    })
}
