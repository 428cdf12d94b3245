//! V3 analyzer (A): concentrated-liquidity price math, cross-tick swap
//! simulation, fee-tier arbitrage, tick-crossing and JIT-liquidity
//! detection, and the multicall-based tick-window fetch that feeds all
//! of the above (§4.2). Owned per-chain-worker, same as the transport
//! pool — nothing here is shared across chains.

pub mod cache;
pub mod fee_tier;
pub mod jit;
pub mod swap_sim;
pub mod tick_math;
pub mod tick_tracker;

pub use cache::TickCache;
pub use fee_tier::{
    build_depth_profile, detect_fee_tier_arbitrage, select_optimal_tier, DepthLevel, DepthProfile,
    FeeTierQuote,
};
pub use jit::detect_jit;
pub use swap_sim::{calculate_swap_output_with_ticks, SwapResult};
pub use tick_tracker::TickTracker;

use crate::contracts::{Multicall3, UniswapV3Pool, MULTICALL3_ADDRESS};
use crate::error::{CoreError, CoreResult};
use crate::types::{BundleTiming, LiquidityEvent, Tick};
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider};
use dashmap::DashMap;
use std::time::Instant;
use tracing::warn;

const MULTICALL_CHUNK_SIZE: usize = 50;

/// Fetches the initialized-tick window around `current_tick`, `window`
/// spacings in each direction, via chunked `tryAggregate(requireSuccess:
/// false, ...)` calls (§4.2, grounded on the teacher's
/// `arbitrage/multicall_quoter.rs` allow-partial-failure pattern, recast
/// onto alloy's typed `sol!` bindings instead of manual ABI bytes).
pub async fn fetch_tick_window(
    provider: &DynProvider,
    pool: Address,
    current_tick: i32,
    tick_spacing: i32,
    window: i32,
) -> CoreResult<Vec<Tick>> {
    if tick_spacing <= 0 {
        return Err(CoreError::DecodeError {
            message: format!("invalid tick spacing {tick_spacing} for pool {pool:?}"),
        });
    }
    let base = current_tick.div_euclid(tick_spacing) * tick_spacing;
    let wanted_ticks: Vec<i32> = (-window..=window).map(|i| base + i * tick_spacing).collect();

    let multicall = Multicall3::new(MULTICALL3_ADDRESS, provider.clone());
    let mut out = Vec::with_capacity(wanted_ticks.len());

    for chunk in wanted_ticks.chunks(MULTICALL_CHUNK_SIZE) {
        let calls: Vec<Multicall3::Call> = chunk
            .iter()
            .map(|&tick| Multicall3::Call {
                target: pool,
                callData: UniswapV3Pool::ticksCall { tick }.abi_encode().into(),
            })
            .collect();

        let results = multicall
            .tryAggregate(false, calls)
            .call()
            .await
            .map_err(|e| CoreError::TransportTransient {
                endpoint: pool.to_string(),
                message: format!("multicall tick fetch failed: {e}"),
            })?;

        for (tick, result) in chunk.iter().zip(results.iter()) {
            if !result.success {
                continue;
            }
            match UniswapV3Pool::ticksCall::abi_decode_returns(&result.returnData) {
                Ok(decoded) => {
                    if decoded.initialized {
                        out.push(Tick {
                            index: *tick,
                            liquidity_gross: decoded.liquidityGross,
                            liquidity_net: decoded.liquidityNet,
                            initialized: true,
                        });
                    }
                }
                Err(e) => warn!("failed to decode ticks() return for pool {pool:?} tick {tick}: {e}"),
            }
        }
    }

    Ok(out)
}

/// Fetches `tickSpacing()` once per pool (cheap, cacheable at the caller).
pub async fn fetch_tick_spacing(provider: &DynProvider, pool: Address) -> CoreResult<i32> {
    let contract = UniswapV3Pool::new(pool, provider.clone());
    let spacing = contract
        .tickSpacing()
        .call()
        .await
        .map_err(|e| CoreError::TransportTransient {
            endpoint: pool.to_string(),
            message: format!("tickSpacing() failed: {e}"),
        })?;
    Ok(spacing.as_i32())
}

/// Per-chain V3 analyzer state: the tick cache, the tick-crossing
/// tracker, and per-pool liquidity-event history for JIT detection.
pub struct V3Analyzer {
    pub cache: TickCache,
    tracker: std::sync::Mutex<TickTracker>,
    bundles: DashMap<Address, BundleTiming>,
    jit_window_secs: u64,
    jit_threshold: f64,
    tick_crossing_threshold: i32,
}

impl V3Analyzer {
    pub fn new(
        tick_bucket_size: i32,
        cache_ttl_secs: u64,
        jit_window_secs: u64,
        jit_threshold: f64,
        tick_crossing_threshold: i32,
    ) -> Self {
        Self {
            cache: TickCache::new(tick_bucket_size, cache_ttl_secs),
            tracker: std::sync::Mutex::new(TickTracker::new()),
            bundles: DashMap::new(),
            jit_window_secs,
            jit_threshold,
            tick_crossing_threshold,
        }
    }

    pub fn record_liquidity_event(&self, pool: Address, delta: i128, tick: i32) {
        let mut entry = self.bundles.entry(pool).or_default();
        entry.push(
            LiquidityEvent {
                at: Instant::now(),
                delta,
                tick,
            },
            self.jit_window_secs,
        );
    }

    pub fn jit_status(
        &self,
        pool: Address,
        current_tick: i32,
        tick_spacing: i32,
        k: i32,
    ) -> Option<crate::types::JitLiquidity> {
        let bundle = self.bundles.get(&pool)?;
        detect_jit(
            &bundle,
            pool,
            current_tick,
            self.jit_window_secs,
            self.jit_threshold,
            tick_spacing,
            k,
        )
    }

    pub fn observe_tick(
        &self,
        pool: Address,
        current_tick: i32,
        current_liquidity: u128,
        decimals0: u8,
        decimals1: u8,
    ) -> Option<crate::types::TickCrossing> {
        self.tracker.lock().unwrap().observe(
            pool,
            current_tick,
            current_liquidity,
            self.tick_crossing_threshold,
            decimals0,
            decimals1,
        )
    }
}
