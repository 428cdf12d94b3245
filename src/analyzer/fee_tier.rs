//! V3 fee-tier arbitrage detection, optimal-tier routing, and depth
//! profile (§4.2).
//!
//! The same pair can trade at several fee tiers (0.05% / 0.3% / 1%) on
//! the same DEX; a persistent price gap between tiers, once fees are
//! netted, is itself a spread.

use crate::types::{Tick, V3FeeTierPayload};
use alloy::primitives::{Address, U256};

#[derive(Debug, Clone)]
pub struct FeeTierQuote {
    pub fee_tier: u32,
    /// Fee as a fraction, e.g. `0.0005` for the 5bp tier.
    pub fee_fraction: f64,
    pub price: f64,
    pub liquidity: u128,
    pub liquidity_usd: f64,
    /// Pool identity + raw V3 state, carried through so a caller holding a
    /// `&FeeTierQuote` (e.g. after `select_optimal_tier`) can still look up
    /// this pool's cached tick window for a depth profile or swap
    /// simulation without re-threading the original `PoolState`.
    pub pool: Address,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub decimals0: u8,
    pub decimals1: u8,
}

const DEFAULT_SPREAD_THRESHOLD_PCT: f64 = 0.1;

/// `effective_buy = price_low · (1 + fee_low)`, `effective_sell =
/// price_high · (1 − fee_high)`, `spread_pct = (effective_sell −
/// effective_buy) / effective_buy · 100`. Emits when `spread_pct >=
/// fee_tier_spread_threshold`.
pub fn detect_fee_tier_arbitrage(
    pair_key: &str,
    quotes: &[FeeTierQuote],
    spread_threshold_pct: f64,
    min_liquidity_usd: f64,
) -> Option<V3FeeTierPayload> {
    let mut usable: Vec<&FeeTierQuote> = quotes
        .iter()
        .filter(|q| q.liquidity_usd >= min_liquidity_usd && q.price.is_finite() && q.price > 0.0)
        .collect();
    if usable.len() < 2 {
        return None;
    }
    usable.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());

    let low = usable.first()?;
    let high = usable.last()?;
    if low.fee_tier == high.fee_tier {
        return None;
    }

    let effective_buy = low.price * (1.0 + low.fee_fraction);
    let effective_sell = high.price * (1.0 - high.fee_fraction);
    if effective_buy <= 0.0 {
        return None;
    }
    let spread_pct = (effective_sell - effective_buy) / effective_buy * 100.0;
    let threshold = if spread_threshold_pct > 0.0 {
        spread_threshold_pct
    } else {
        DEFAULT_SPREAD_THRESHOLD_PCT
    };
    if spread_pct < threshold {
        return None;
    }

    Some(V3FeeTierPayload {
        pair_key: pair_key.to_string(),
        buy_tier: low.fee_tier,
        sell_tier: high.fee_tier,
        buy_price: low.price,
        sell_price: high.price,
        spread_pct,
    })
}

/// For a target trade size, skips tiers with `liquidity_usd <
/// trade_size_usd * 50` (<=2% utilization). Price impact estimate is
/// `(trade_size_usd / liquidity_usd) * 50` percent; effective price
/// folds in fee + impact in the direction of the trade. Minimizes
/// effective price when buying, maximizes when selling.
pub fn select_optimal_tier<'a>(
    quotes: &'a [FeeTierQuote],
    trade_size_usd: f64,
    is_buy: bool,
) -> Option<&'a FeeTierQuote> {
    let candidates: Vec<(&FeeTierQuote, f64)> = quotes
        .iter()
        .filter(|q| q.liquidity_usd >= trade_size_usd * 50.0)
        .map(|q| {
            let impact_pct = (trade_size_usd / q.liquidity_usd) * 50.0;
            let effective_price = if is_buy {
                q.price * (1.0 + q.fee_fraction) * (1.0 + impact_pct / 100.0)
            } else {
                q.price * (1.0 - q.fee_fraction) * (1.0 - impact_pct / 100.0)
            };
            (q, effective_price)
        })
        .collect();

    if candidates.is_empty() {
        return quotes
            .iter()
            .max_by(|a, b| a.liquidity_usd.partial_cmp(&b.liquidity_usd).unwrap());
    }

    if is_buy {
        candidates
            .into_iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(q, _)| q)
    } else {
        candidates
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(q, _)| q)
    }
}

pub fn offsets() -> [f64; 4] {
    [0.5, 1.0, 2.0, 5.0]
}

#[derive(Debug, Clone)]
pub struct DepthLevel {
    pub offset_pct: f64,
    pub buy_capacity: u128,
    pub sell_capacity: u128,
    pub ticks_traversed: u32,
}

#[derive(Debug, Clone)]
pub struct DepthProfile {
    pub levels: Vec<DepthLevel>,
    pub depth_score: f64,
}

/// Walks `ticks` outward from `current_tick` in each direction until the
/// accumulated price change matches each target offset, summing
/// `liquidity_gross` traversed as the capacity estimate for that level.
/// `depth_score` is the fraction of offsets for which liquidity was found
/// in both directions before exhausting the known tick set.
pub fn build_depth_profile(current_tick: i32, ticks: &[Tick]) -> DepthProfile {
    let mut below: Vec<&Tick> = ticks.iter().filter(|t| t.index < current_tick).collect();
    below.sort_by(|a, b| b.index.cmp(&a.index));
    let mut above: Vec<&Tick> = ticks.iter().filter(|t| t.index > current_tick).collect();
    above.sort_by_key(|t| t.index);

    let ln_1_0001 = 1.0001f64.ln();
    let mut levels = Vec::with_capacity(offsets().len());
    let mut complete_levels = 0usize;

    for offset_pct in offsets() {
        let ticks_needed = ((1.0 + offset_pct / 100.0).ln() / ln_1_0001).abs().ceil() as i32;
        let sell_bound = current_tick - ticks_needed; // price decreases selling token0
        let buy_bound = current_tick + ticks_needed; // price increases buying token0

        let mut sell_capacity = 0u128;
        let mut sell_traversed = 0u32;
        let mut found_sell_bound = false;
        for t in &below {
            sell_capacity += t.liquidity_gross;
            sell_traversed += 1;
            if t.index <= sell_bound {
                found_sell_bound = true;
                break;
            }
        }

        let mut buy_capacity = 0u128;
        let mut buy_traversed = 0u32;
        let mut found_buy_bound = false;
        for t in &above {
            buy_capacity += t.liquidity_gross;
            buy_traversed += 1;
            if t.index >= buy_bound {
                found_buy_bound = true;
                break;
            }
        }

        if found_sell_bound && found_buy_bound {
            complete_levels += 1;
        }

        levels.push(DepthLevel {
            offset_pct,
            buy_capacity,
            sell_capacity,
            ticks_traversed: sell_traversed.max(buy_traversed),
        });
    }

    let depth_score = complete_levels as f64 / offsets().len() as f64;

    DepthProfile {
        levels,
        depth_score,
    }
}
