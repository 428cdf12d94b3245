//! Cross-tick swap simulation (`calculate_swap_output_with_ticks`, §4.2).
//!
//! Uses the exact Uniswap V3 `Δx`/`Δy` relations over `sqrtPriceX96`
//! (`ΔsqrtP = Δx · sqrtP_cur · sqrtP_tgt / liquidity` and its dual for the
//! `1→0` direction), not the source's linear `liquidity · priceChange`
//! approximation (§9 design note). Every swap-amount quantity in the loop
//! below — `Δx`/`Δy`, the running `remaining`/`amount_out_total`, and the
//! target `sqrtP` at each step — stays in `U256` end to end; `f64` only
//! appears once the loop is done, to report `price_impact_pct` and
//! `effective_price`.

use super::tick_math::{sqrt_price_x96_to_price, tick_to_sqrt_price_x96, u256_to_f64};
use crate::types::Tick;
use alloy::primitives::{U256, U512};

const MAX_CROSSINGS: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct SwapResult {
    pub amount_out: U256,
    pub price_impact_pct: f64,
    pub ticks_crossed: u32,
    pub effective_price: f64,
}

/// Full-precision `(a * b) / denom` via a 512-bit intermediate product —
/// the same trick Uniswap's own `FullMath.mulDiv` relies on to avoid the
/// overflow a direct 256-bit multiply hits once both operands carry real
/// `sqrtPriceX96` magnitude. Saturates at `U256::MAX` if the quotient
/// itself doesn't fit back into 256 bits.
fn mul_div(a: U256, b: U256, denom: U256) -> U256 {
    if denom.is_zero() {
        return U256::ZERO;
    }
    let product = U512::from(a) * U512::from(b);
    U256::try_from(product / U512::from(denom)).unwrap_or(U256::MAX)
}

/// `Δx = L·2^96·(sqrtA − sqrtB)/(sqrtA·sqrtB) = L·2^96/lo − L·2^96/hi`,
/// `sqrtA >= sqrtB`. `U256::MAX` stands in for "infinite distance" when
/// `lo` is zero — the caller's `remaining >= needed` check then always
/// takes the partial-fill branch, same as the old float-infinity sentinel.
fn amount0_delta(liquidity: u128, sqrt_a: U256, sqrt_b: U256) -> U256 {
    let (hi, lo) = if sqrt_a >= sqrt_b { (sqrt_a, sqrt_b) } else { (sqrt_b, sqrt_a) };
    if lo.is_zero() {
        return U256::MAX;
    }
    let l_q96 = U256::from(liquidity) << 96;
    (l_q96 / lo).saturating_sub(l_q96 / hi)
}

/// `Δy = L·(sqrtB − sqrtA)/2^96`, `sqrtB >= sqrtA`.
fn amount1_delta(liquidity: u128, sqrt_a: U256, sqrt_b: U256) -> U256 {
    let (lo, hi) = if sqrt_a <= sqrt_b { (sqrt_a, sqrt_b) } else { (sqrt_b, sqrt_a) };
    mul_div(U256::from(liquidity), hi - lo, U256::from(1u64) << 96)
}

/// Solves the exact formula for the ending `sqrtP` reached after consuming
/// all of `amount_in` (known to be smaller than what's needed to reach the
/// next tick) at constant liquidity `L`.
fn partial_sqrt_target(liquidity: u128, sqrt_cur: U256, amount_in: U256, zero_for_one: bool) -> U256 {
    if zero_for_one {
        // sqrtP_tgt = L·2^96·sqrtP_cur / (amount_in·sqrtP_cur + L·2^96),
        // solved from Δx·sqrtP_cur·sqrtP_tgt/L = sqrtP_cur - sqrtP_tgt.
        let l_q96 = U512::from(U256::from(liquidity) << 96);
        let sqrt_cur_512 = U512::from(sqrt_cur);
        let denom = U512::from(amount_in) * sqrt_cur_512 + l_q96;
        if denom.is_zero() {
            return sqrt_cur;
        }
        U256::try_from((l_q96 * sqrt_cur_512) / denom).unwrap_or(U256::MAX)
    } else {
        let delta = mul_div(amount_in, U256::from(1u64) << 96, U256::from(liquidity.max(1)));
        sqrt_cur.saturating_add(delta)
    }
}

pub fn calculate_swap_output_with_ticks(
    amount_in: U256,
    sqrt_price_x96: U256,
    liquidity: u128,
    current_tick: i32,
    ticks: &[Tick],
    fee_tier: u32,
    zero_for_one: bool,
    decimals0: u8,
    decimals1: u8,
) -> SwapResult {
    let initial_price = sqrt_price_x96_to_price(sqrt_price_x96, decimals0, decimals1);

    if amount_in.is_zero() || sqrt_price_x96.is_zero() || liquidity == 0 {
        return SwapResult {
            amount_out: U256::ZERO,
            price_impact_pct: 0.0,
            ticks_crossed: 0,
            effective_price: 0.0,
        };
    }

    let fee_fraction_complement = U256::from(1_000_000u32.saturating_sub(fee_tier));
    let mut remaining = mul_div(amount_in, fee_fraction_complement, U256::from(1_000_000u32));
    let mut amount_out_total = U256::ZERO;
    let mut cur_sqrt = sqrt_price_x96;
    let mut cur_liquidity = liquidity;
    let mut crossings: u32 = 0;

    let mut relevant: Vec<&Tick> = ticks
        .iter()
        .filter(|t| if zero_for_one { t.index < current_tick } else { t.index > current_tick })
        .collect();
    if zero_for_one {
        relevant.sort_by(|a, b| b.index.cmp(&a.index));
    } else {
        relevant.sort_by_key(|t| t.index);
    }
    let mut tick_iter = relevant.into_iter();

    while !remaining.is_zero() && crossings < MAX_CROSSINGS {
        let Some(next_tick) = tick_iter.next() else {
            // No next tick: consume the rest at current liquidity.
            let target_sqrt = partial_sqrt_target(cur_liquidity, cur_sqrt, remaining, zero_for_one);
            let out = if zero_for_one {
                amount1_delta(cur_liquidity, cur_sqrt, target_sqrt)
            } else {
                amount0_delta(cur_liquidity, cur_sqrt, target_sqrt)
            };
            amount_out_total = amount_out_total.saturating_add(out);
            cur_sqrt = target_sqrt;
            remaining = U256::ZERO;
            break;
        };

        let target_sqrt = tick_to_sqrt_price_x96(next_tick.index);

        let needed = if zero_for_one {
            amount0_delta(cur_liquidity, cur_sqrt, target_sqrt)
        } else {
            amount1_delta(cur_liquidity, cur_sqrt, target_sqrt)
        };

        if remaining >= needed {
            let out = if zero_for_one {
                amount1_delta(cur_liquidity, cur_sqrt, target_sqrt)
            } else {
                amount0_delta(cur_liquidity, cur_sqrt, target_sqrt)
            };
            amount_out_total = amount_out_total.saturating_add(out);
            remaining -= needed;
            cur_sqrt = target_sqrt;
            let net = next_tick.liquidity_net;
            cur_liquidity = if zero_for_one {
                (cur_liquidity as i128).saturating_sub(net).max(0) as u128
            } else {
                (cur_liquidity as i128).saturating_add(net).max(0) as u128
            };
            crossings += 1;
        } else {
            let target_sqrt_partial = partial_sqrt_target(cur_liquidity, cur_sqrt, remaining, zero_for_one);
            let out = if zero_for_one {
                amount1_delta(cur_liquidity, cur_sqrt, target_sqrt_partial)
            } else {
                amount0_delta(cur_liquidity, cur_sqrt, target_sqrt_partial)
            };
            amount_out_total = amount_out_total.saturating_add(out);
            cur_sqrt = target_sqrt_partial;
            remaining = U256::ZERO;
        }
    }

    let final_price = sqrt_price_x96_to_price(cur_sqrt, decimals0, decimals1);
    let price_impact_pct = if initial_price > 0.0 {
        ((final_price - initial_price) / initial_price).abs() * 100.0
    } else {
        0.0
    };

    let decimals_in = if zero_for_one { decimals0 } else { decimals1 };
    let decimals_out = if zero_for_one { decimals1 } else { decimals0 };
    let amount_in_human = u256_to_f64(amount_in) / 10f64.powi(decimals_in as i32);
    let amount_out_human = u256_to_f64(amount_out_total) / 10f64.powi(decimals_out as i32);
    let effective_price = if amount_in_human > 0.0 {
        amount_out_human / amount_in_human
    } else {
        0.0
    };

    SwapResult {
        amount_out: amount_out_total,
        price_impact_pct,
        ticks_crossed: crossings,
        effective_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::tick_math::price_to_sqrt_price_x96;

    #[test]
    fn small_swap_within_current_range_produces_no_crossings() {
        let sqrt_price = price_to_sqrt_price_x96(3000.0, 18, 6);
        let result = calculate_swap_output_with_ticks(
            U256::from(1_000_000_000_000_000_000u128), // 1 WETH
            sqrt_price,
            1_000_000_000_000_000_000_000u128,
            0,
            &[],
            3000,
            true,
            18,
            6,
        );
        assert_eq!(result.ticks_crossed, 0);
        assert!(result.amount_out > U256::ZERO);
    }

    #[test]
    fn zero_amount_in_yields_zero_output() {
        let sqrt_price = price_to_sqrt_price_x96(3000.0, 18, 6);
        let result = calculate_swap_output_with_ticks(
            U256::ZERO,
            sqrt_price,
            1_000_000_000_000_000_000u128,
            0,
            &[],
            3000,
            true,
            18,
            6,
        );
        assert_eq!(result.amount_out, U256::ZERO);
    }

    #[test]
    fn crossing_cap_truncates_at_ten() {
        let sqrt_price = price_to_sqrt_price_x96(1.0, 18, 18);
        let ticks: Vec<Tick> = (1..30)
            .map(|i| Tick {
                index: -i * 10,
                liquidity_gross: 1_000_000_000_000u128,
                liquidity_net: -100_000_000_000i128,
                initialized: true,
            })
            .collect();
        let result = calculate_swap_output_with_ticks(
            U256::from(10_000_000_000_000_000_000_000u128),
            sqrt_price,
            1_000_000_000_000_000_000u128,
            0,
            &ticks,
            3000,
            true,
            18,
            18,
        );
        assert!(result.ticks_crossed <= MAX_CROSSINGS);
    }

    #[test]
    fn large_swap_uses_full_precision_multiply_without_overflow() {
        // liquidity and sqrtPriceX96 both near realistic upper bounds —
        // exercises the mul_div 512-bit path rather than a plain U256
        // multiply, which would panic on overflow here.
        let sqrt_price = price_to_sqrt_price_x96(1.5e9, 18, 6);
        let result = calculate_swap_output_with_ticks(
            U256::from(1_000_000_000_000_000_000_000u128),
            sqrt_price,
            u128::MAX / 2,
            0,
            &[],
            3000,
            false,
            18,
            6,
        );
        assert!(result.amount_out >= U256::ZERO);
        assert!(result.price_impact_pct.is_finite());
    }
}
