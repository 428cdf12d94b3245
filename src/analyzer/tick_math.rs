//! V3 tick/price math (§4.2).
//!
//! `sqrtPriceX96` routinely exceeds 2^53, so any conversion that goes
//! through a naive float cast of the full integer silently loses or
//! mangles precision. Every conversion here goes through an explicit
//! mantissa/exponent extraction (exact integer shifts) before ever
//! touching a float, and the square root itself is a genuine BigInt
//! (Newton's method) implementation rather than `f64::sqrt`.

use alloy::primitives::U256;

/// Software integer square root via Newton's method.
/// `bigint_sqrt(n)^2 <= n < (bigint_sqrt(n)+1)^2` for all `n >= 0` (§8.3).
pub fn bigint_sqrt(n: U256) -> U256 {
    if n.is_zero() {
        return U256::ZERO;
    }
    if n <= U256::from(3u64) {
        return U256::from(1u64);
    }
    // Initial guess: 2^ceil(bitlen/2), always >= the true root.
    let bitlen = 256 - n.leading_zeros();
    let mut x = U256::from(1u64) << ((bitlen as usize + 1) / 2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            break;
        }
        x = y;
    }
    x
}

/// Extracts a `(mantissa: u64, binary_exponent: i32)` pair such that
/// `n ~= mantissa * 2^exponent`, keeping 64 bits of precision — more than
/// an `f64` mantissa can use, so the only precision lost in the eventual
/// float conversion is `f64`'s own, not an artifact of this extraction.
fn u256_mantissa_exp(n: U256) -> (u64, i32) {
    if n.is_zero() {
        return (0, 0);
    }
    let bitlen = 256 - n.leading_zeros();
    if bitlen <= 64 {
        (n.as_limbs()[0], 0)
    } else {
        let shift = bitlen - 64;
        ((n >> shift as usize).as_limbs()[0], shift as i32)
    }
}

pub(crate) fn u256_to_f64(n: U256) -> f64 {
    let (mantissa, exp) = u256_mantissa_exp(n);
    (mantissa as f64) * 2f64.powi(exp)
}

/// Exact (up to the source float's own precision) construction of
/// `floor(x * 2^scale_bits)` as a `U256`, via bit decomposition of `x`
/// rather than a float multiply that could overflow `f64`'s 53-bit
/// mantissa once `x * 2^scale_bits` is large.
fn f64_to_u256_scaled(x: f64, scale_bits: i32) -> U256 {
    if x <= 0.0 || !x.is_finite() {
        return U256::ZERO;
    }
    let bits = x.to_bits();
    let raw_exponent = ((bits >> 52) & 0x7FF) as i64;
    if raw_exponent == 0 {
        return U256::ZERO; // subnormal, negligible for our domain
    }
    let exponent = raw_exponent - 1023;
    let mantissa = (bits & 0xF_FFFF_FFFF_FFFF) | (1u64 << 52);
    let shift = exponent - 52 + scale_bits as i64;
    let mantissa_u256 = U256::from(mantissa);
    if shift >= 0 {
        if shift >= 256 {
            U256::MAX
        } else {
            mantissa_u256 << (shift as usize)
        }
    } else if -shift >= 256 {
        U256::ZERO
    } else {
        mantissa_u256 >> ((-shift) as usize)
    }
}

/// `price = amount_of_token1 / amount_of_token0` (raw base units, no
/// decimal adjustment) -> `sqrtPriceX96 = floor(sqrt(price) * 2^96)`,
/// computed via the BigInt square root above.
fn raw_price_to_sqrt_price_x96(raw_price: f64) -> U256 {
    if raw_price <= 0.0 || !raw_price.is_finite() {
        return U256::ZERO;
    }
    let ratio_q192 = f64_to_u256_scaled(raw_price, 192);
    bigint_sqrt(ratio_q192)
}

/// Decimal-normalized price -> `sqrtPriceX96`. Inverse of
/// `sqrt_price_x96_to_price`.
pub fn price_to_sqrt_price_x96(price: f64, decimals0: u8, decimals1: u8) -> U256 {
    if price <= 0.0 || !price.is_finite() {
        return U256::ZERO;
    }
    let exp = decimals1 as i32 - decimals0 as i32;
    let raw_price = price * 10f64.powi(exp);
    raw_price_to_sqrt_price_x96(raw_price)
}

/// `sqrtPriceX96` -> decimal-normalized floating-point price. Returns 0
/// for zero input (§4.2).
pub fn sqrt_price_x96_to_price(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> f64 {
    if sqrt_price_x96.is_zero() {
        return 0.0;
    }
    let sqrt_val = u256_to_f64(sqrt_price_x96) / 2f64.powi(96);
    let raw_price = sqrt_val * sqrt_val;
    raw_price * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

/// `tick -> sqrtPriceX96`, via `price = 1.0001^tick` (raw, undecimaled).
pub fn tick_to_sqrt_price_x96(tick: i32) -> U256 {
    let raw_price = 1.0001f64.powi(tick);
    raw_price_to_sqrt_price_x96(raw_price)
}

/// Decimal-normalized price from a tick directly (teacher's
/// `price_from_tick`, generalized to any chain/pair).
pub fn tick_to_price(tick: i32, decimals0: u8, decimals1: u8) -> f64 {
    1.0001f64.powi(tick) * 10f64.powi(decimals0 as i32 - decimals1 as i32)
}

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_sqrt_matches_definition_for_small_values() {
        for n in 0u64..2000 {
            let n256 = U256::from(n);
            let root = bigint_sqrt(n256);
            assert!(root * root <= n256);
            assert!((root + U256::from(1u64)) * (root + U256::from(1u64)) > n256);
        }
    }

    #[test]
    fn bigint_sqrt_handles_large_values_without_overflow() {
        let n = U256::from(1u64) << 250;
        let root = bigint_sqrt(n);
        assert!(root * root <= n);
    }

    #[test]
    fn bigint_sqrt_of_perfect_square() {
        let n = U256::from(144u64);
        assert_eq!(bigint_sqrt(n), U256::from(12u64));
    }

    #[test]
    fn price_round_trips_through_sqrt_price_x96() {
        for &p in &[0.0001, 1.0, 3000.0, 1.5e9] {
            let sqrt_px = price_to_sqrt_price_x96(p, 18, 6);
            let round_tripped = sqrt_price_x96_to_price(sqrt_px, 18, 6);
            let rel_err = ((round_tripped - p) / p).abs();
            assert!(rel_err < 1e-6, "price={p} round_tripped={round_tripped}");
        }
    }

    #[test]
    fn zero_sqrt_price_maps_to_zero_price() {
        assert_eq!(sqrt_price_x96_to_price(U256::ZERO, 18, 18), 0.0);
    }

    #[test]
    fn tick_zero_is_unity_price() {
        let price = tick_to_price(0, 18, 18);
        assert!((price - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tick_to_sqrt_price_round_trips_reasonably() {
        for tick in [-200_000, -1000, 0, 1000, 200_000] {
            let sqrt_px = tick_to_sqrt_price_x96(tick);
            let reconstructed_raw = sqrt_price_x96_to_price(sqrt_px, 0, 0);
            let expected_raw = 1.0001f64.powi(tick);
            let rel_err = ((reconstructed_raw - expected_raw) / expected_raw).abs();
            assert!(rel_err < 1e-6, "tick={tick}");
        }
    }
}
