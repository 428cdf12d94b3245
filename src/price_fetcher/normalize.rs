//! Decimal normalization and liquidity USD estimation (§4.3).
//!
//! The reverse price must be the reciprocal of the decimal-normalized
//! forward price, never a raw-reserve ratio — mixing decimals (e.g. a
//! USDC/WETH pair, 6 vs 18 decimals) makes the raw ratio off by
//! `10^12`, a bug class the source exhibited.

use crate::analyzer::tick_math::u256_to_f64;
use alloy::primitives::U256;

/// Static fallback USD price table for tokens without a quoted stable
/// counterpart in the current snapshot, generalized from the teacher's
/// single-chain `weth_price_usd`/`native_token_price_usd` config knobs
/// into a symbol-keyed table spanning the DEXes this bot now targets.
pub fn fallback_price_usd(symbol: &str) -> f64 {
    match symbol.to_ascii_uppercase().as_str() {
        "USDC" | "USDC.E" | "USDT" | "DAI" | "BUSD" | "FRAX" | "USDBC" => 1.0,
        "WETH" | "ETH" | "WSTETH" | "RETH" => 3300.0,
        "WBTC" | "BTC" => 64_000.0,
        "WMATIC" | "MATIC" | "POL" => 0.50,
        "WBNB" | "BNB" => 560.0,
        "WAVAX" | "AVAX" => 35.0,
        "ARB" => 1.0,
        "OP" => 1.8,
        _ => 0.0,
    }
}

/// `forward_price = (reserveB · 10^dA) / (reserveA · 10^dB)` for pair
/// `(A, B)` — i.e. token1-per-token0 when `A == token0`, `B == token1`.
pub fn v2_forward_price(reserve_a: U256, reserve_b: U256, decimals_a: u8, decimals_b: u8) -> f64 {
    let ra = u256_to_f64(reserve_a);
    let rb = u256_to_f64(reserve_b);
    if ra <= 0.0 || rb <= 0.0 {
        return 0.0;
    }
    (rb * 10f64.powi(decimals_a as i32)) / (ra * 10f64.powi(decimals_b as i32))
}

/// `reverse_price = 1 / forward_price` — never a raw `reserveA/reserveB`.
pub fn v2_reverse_price(forward_price: f64) -> f64 {
    if forward_price <= 0.0 || !forward_price.is_finite() {
        0.0
    } else {
        1.0 / forward_price
    }
}

/// `reserveA` converted to its human-readable (decimal-adjusted) amount.
pub fn normalize_reserve(reserve: U256, decimals: u8) -> f64 {
    u256_to_f64(reserve) / 10f64.powi(decimals as i32)
}

/// `liquidity_usd ~= 2 * reserveA_normalized * price_usd(A)`. `price_usd_a`
/// is the known USD price of token A if it's a base token with one;
/// otherwise the caller should pass `fallback_price_usd(symbol_a)`.
pub fn liquidity_usd_estimate(reserve_a_normalized: f64, price_usd_a: f64) -> f64 {
    if reserve_a_normalized <= 0.0 || price_usd_a <= 0.0 {
        return 0.0;
    }
    2.0 * reserve_a_normalized * price_usd_a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_price_are_reciprocal_across_decimals() {
        // WETH (18 decimals) / USDC (6 decimals), price ~3000 USDC per WETH.
        let reserve_weth = U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64));
        let reserve_usdc = U256::from(3_000_000u64) * U256::from(10u64).pow(U256::from(6u64));
        let forward = v2_forward_price(reserve_weth, reserve_usdc, 18, 6);
        let reverse = v2_reverse_price(forward);
        assert!((forward * reverse - 1.0).abs() < 1e-9, "forward={forward} reverse={reverse}");
        assert!((forward - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn zero_reserve_yields_zero_price() {
        assert_eq!(v2_forward_price(U256::ZERO, U256::from(100u64), 18, 6), 0.0);
    }

    #[test]
    fn fallback_table_treats_stables_as_one() {
        assert_eq!(fallback_price_usd("USDC"), 1.0);
        assert_eq!(fallback_price_usd("usdt"), 1.0);
    }

    #[test]
    fn liquidity_estimate_scales_with_reserve_and_price() {
        let estimate = liquidity_usd_estimate(10.0, 3000.0);
        assert_eq!(estimate, 60_000.0);
    }
}
