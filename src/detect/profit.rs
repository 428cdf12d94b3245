//! Shared profit-calculation primitives used by the cross-DEX and
//! triangular detectors (§4.4, §4.5): the V2 constant-product swap
//! formula, flash-loan fee, gas cost, and slippage netting, plus the
//! logarithmic trade-size grid search both detectors run.

/// `amountOut = (amountIn · (1 − fee) · reserveOut) / (reserveIn + amountIn · (1 − fee))`.
/// Returns 0 (never `Infinity`/`NaN`) when either reserve is non-positive —
/// a bug class the source exhibited (§4.4).
pub fn v2_amount_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee_fraction: f64) -> f64 {
    if reserve_in <= 0.0 || reserve_out <= 0.0 || amount_in <= 0.0 || !amount_in.is_finite() {
        return 0.0;
    }
    let amount_in_after_fee = amount_in * (1.0 - fee_fraction);
    let denom = reserve_in + amount_in_after_fee;
    if denom <= 0.0 {
        return 0.0;
    }
    (amount_in_after_fee * reserve_out) / denom
}

/// Flash-loan fee charged once on the borrowed principal, never per hop.
pub fn flash_loan_fee(amount_in_usd: f64, fee_fraction: f64) -> f64 {
    if amount_in_usd <= 0.0 {
        return 0.0;
    }
    amount_in_usd * fee_fraction
}

/// `gas_price_gwei · 1e-9 · gas_limit · native_price_usd`.
pub fn gas_cost_usd(gas_price_gwei: f64, gas_limit: u64, native_price_usd: f64) -> f64 {
    gas_price_gwei * 1e-9 * gas_limit as f64 * native_price_usd
}

/// Expected slippage cost on a trade of `trade_size_usd` at `slippage_pct`
/// (e.g. `max_slippage_pct` from `TradingParams`).
pub fn expected_slippage_usd(trade_size_usd: f64, slippage_pct: f64) -> f64 {
    if trade_size_usd <= 0.0 {
        return 0.0;
    }
    trade_size_usd * slippage_pct / 100.0
}

/// Logarithmically spaced grid in `[min, max]` with `steps` points
/// (inclusive of both ends). Falls back to a single point at `max` when
/// `min <= 0` or `min >= max`.
pub fn log_grid(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if min <= 0.0 || max <= 0.0 || min >= max || steps < 2 {
        return vec![max.max(0.0)];
    }
    let log_min = min.ln();
    let log_max = max.ln();
    let step = (log_max - log_min) / (steps - 1) as f64;
    (0..steps).map(|i| (log_min + step * i as f64).exp()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_reserve_yields_zero_output_not_infinity() {
        assert_eq!(v2_amount_out(100.0, 0.0, 100.0, 0.003), 0.0);
        assert_eq!(v2_amount_out(100.0, 100.0, 0.0, 0.003), 0.0);
    }

    #[test]
    fn amount_out_matches_constant_product_formula() {
        let out = v2_amount_out(10.0, 1000.0, 3_000_000.0, 0.003);
        let expected = (10.0 * 0.997 * 3_000_000.0) / (1000.0 + 10.0 * 0.997);
        assert!((out - expected).abs() < 1e-6);
    }

    #[test]
    fn log_grid_spans_bounds_inclusive() {
        let grid = log_grid(100.0, 10_000.0, 5);
        assert_eq!(grid.len(), 5);
        assert!((grid[0] - 100.0).abs() < 1e-6);
        assert!((grid[4] - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn log_grid_degenerates_to_single_point_on_bad_bounds() {
        assert_eq!(log_grid(0.0, 100.0, 5), vec![100.0]);
        assert_eq!(log_grid(100.0, 10.0, 5), vec![10.0]);
    }
}
