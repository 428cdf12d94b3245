//! Pool state and V3 tick data: `PoolKey`, `PoolState`, `Tick`,
//! `TickCacheEntry`, `BundleTiming`.

use alloy::primitives::{Address, U256};
use std::collections::VecDeque;
use std::time::Instant;

/// `(token_a, token_b, dex_name, fee_tier)` — normalized so `token_a` is the
/// lexicographically smaller address, matching the on-chain V2/V3 token0/1
/// ordering rule (§3, and the "actual token0/1 from the pool, not config"
/// pattern the teacher's syncers already apply).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub token_a: Address,
    pub token_b: Address,
    pub dex_name: String,
    pub fee_tier: Option<u32>,
}

impl PoolKey {
    pub fn new(token0: Address, token1: Address, dex_name: impl Into<String>, fee_tier: Option<u32>) -> Self {
        let (token_a, token_b) = if token0 <= token1 {
            (token0, token1)
        } else {
            (token1, token0)
        };
        Self {
            token_a,
            token_b,
            dex_name: dex_name.into(),
            fee_tier,
        }
    }

    pub fn pair_key(&self) -> String {
        format!("{:?}-{:?}", self.token_a, self.token_b)
    }
}

#[derive(Debug, Clone)]
pub enum PoolState {
    V2 {
        address: Address,
        key: PoolKey,
        reserve0: U256,
        reserve1: U256,
        token0_decimals: u8,
        token1_decimals: u8,
        block_number: u64,
        timestamp_ms: u64,
    },
    V3 {
        address: Address,
        key: PoolKey,
        sqrt_price_x96: U256,
        tick: i32,
        liquidity: u128,
        fee_tier: u32,
        token0_decimals: u8,
        token1_decimals: u8,
        block_number: u64,
        timestamp_ms: u64,
    },
}

impl PoolState {
    pub fn address(&self) -> Address {
        match self {
            PoolState::V2 { address, .. } | PoolState::V3 { address, .. } => *address,
        }
    }

    pub fn key(&self) -> &PoolKey {
        match self {
            PoolState::V2 { key, .. } | PoolState::V3 { key, .. } => key,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            PoolState::V2 { block_number, .. } | PoolState::V3 { block_number, .. } => {
                *block_number
            }
        }
    }

    /// Invariant: for V2, both reserves > 0 for a priced pool; for V3,
    /// sqrt_price_x96 > 0.
    pub fn is_priced(&self) -> bool {
        match self {
            PoolState::V2 {
                reserve0, reserve1, ..
            } => !reserve0.is_zero() && !reserve1.is_zero(),
            PoolState::V3 { sqrt_price_x96, .. } => !sqrt_price_x96.is_zero(),
        }
    }
}

/// A single initialized tick fetched via multicall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub index: i32,
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
    pub initialized: bool,
}

/// Cached tick slice for a pool, keyed by `(pool, current_tick_bucket)`.
#[derive(Debug, Clone)]
pub struct TickCacheEntry {
    pub ticks: Vec<Tick>,
    pub populated_at: Instant,
}

impl TickCacheEntry {
    pub fn new(mut ticks: Vec<Tick>) -> Self {
        ticks.sort_by_key(|t| t.index);
        Self {
            ticks,
            populated_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl_secs: u64, now: Instant) -> bool {
        now.duration_since(self.populated_at).as_secs() >= ttl_secs
    }

    /// Evicted entirely (not just refreshed) after `ttl * 2`.
    pub fn should_evict(&self, ttl_secs: u64, now: Instant) -> bool {
        now.duration_since(self.populated_at).as_secs() >= ttl_secs * 2
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiquidityEvent {
    pub at: Instant,
    pub delta: i128,
    pub tick: i32,
}

/// Sliding window of liquidity add/remove events per pool, used by the
/// JIT-liquidity detector (§4.2). Pruned on every observation.
#[derive(Debug, Clone, Default)]
pub struct BundleTiming {
    pub events: VecDeque<LiquidityEvent>,
}

impl BundleTiming {
    pub fn push(&mut self, event: LiquidityEvent, window_secs: u64) {
        self.events.push_back(event);
        self.prune(window_secs, event.at);
    }

    pub fn prune(&mut self, window_secs: u64, now: Instant) {
        while let Some(front) = self.events.front() {
            if now.duration_since(front.at).as_secs() > window_secs {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}
