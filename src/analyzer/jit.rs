//! JIT-liquidity detector (§4.2): flags the add-then-remove liquidity
//! pattern bots use to capture a single block's fees without taking on
//! lasting inventory risk, so the analyzer can discount quotes sourced
//! from a pool currently running that pattern.

use crate::types::{BundleTiming, JitLiquidity};
use alloy::primitives::Address;

/// Scans `bundle`'s liquidity events for an add followed, within
/// `jit_window_secs`, by a remove at the same tick whose magnitude is at
/// least `jit_threshold` of the add — the JIT signature. Returns the
/// largest such pair found, if any. `is_near_current_tick` uses
/// `|event_tick - current_tick| < tick_spacing * k` (§4.2).
pub fn detect_jit(
    bundle: &BundleTiming,
    pool: Address,
    current_tick: i32,
    jit_window_secs: u64,
    jit_threshold: f64,
    tick_spacing: i32,
    k: i32,
) -> Option<JitLiquidity> {
    let events: Vec<_> = bundle.events.iter().collect();
    let mut best: Option<JitLiquidity> = None;

    for (i, add) in events.iter().enumerate() {
        if add.delta <= 0 {
            continue;
        }
        for remove in events.iter().skip(i + 1) {
            if remove.delta >= 0 {
                continue;
            }
            if remove.tick != add.tick {
                continue;
            }
            let elapsed = remove.at.duration_since(add.at).as_secs();
            if elapsed > jit_window_secs {
                continue;
            }
            let add_mag = add.delta;
            let remove_mag = remove.delta.unsigned_abs() as i128;
            if (remove_mag as f64) < jit_threshold * (add_mag as f64) {
                continue;
            }
            let near_range = (tick_spacing.max(1)) * k.max(1);
            let is_near_current_tick = (add.tick - current_tick).abs() < near_range;
            let candidate = JitLiquidity {
                pool_address: pool,
                tick: add.tick,
                add_magnitude: add_mag,
                remove_magnitude: remove_mag,
                is_near_current_tick,
            };
            let better = best
                .as_ref()
                .map(|b| candidate.add_magnitude > b.add_magnitude)
                .unwrap_or(true);
            if better {
                best = Some(candidate);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LiquidityEvent;
    use std::time::{Duration, Instant};

    #[test]
    fn detects_add_then_remove_within_window() {
        let t0 = Instant::now();
        let mut bundle = BundleTiming::default();
        bundle.events.push_back(LiquidityEvent {
            at: t0,
            delta: 1_000_000,
            tick: 100,
        });
        bundle.events.push_back(LiquidityEvent {
            at: t0 + Duration::from_secs(5),
            delta: -950_000,
            tick: 100,
        });
        let result = detect_jit(&bundle, Address::ZERO, 100, 60, 0.8, 60, 10).unwrap();
        assert_eq!(result.add_magnitude, 1_000_000);
        assert!(result.is_near_current_tick);
    }

    #[test]
    fn ignores_remove_outside_window() {
        let t0 = Instant::now();
        let mut bundle = BundleTiming::default();
        bundle.events.push_back(LiquidityEvent {
            at: t0,
            delta: 1_000_000,
            tick: 100,
        });
        bundle.events.push_back(LiquidityEvent {
            at: t0 + Duration::from_secs(120),
            delta: -950_000,
            tick: 100,
        });
        assert!(detect_jit(&bundle, Address::ZERO, 100, 60, 0.8, 60, 10).is_none());
    }

    #[test]
    fn ignores_remove_below_threshold_fraction() {
        let t0 = Instant::now();
        let mut bundle = BundleTiming::default();
        bundle.events.push_back(LiquidityEvent {
            at: t0,
            delta: 1_000_000,
            tick: 100,
        });
        bundle.events.push_back(LiquidityEvent {
            at: t0 + Duration::from_secs(5),
            delta: -100_000,
            tick: 100,
        });
        assert!(detect_jit(&bundle, Address::ZERO, 100, 60, 0.8, 60, 10).is_none());
    }

    #[test]
    fn flags_far_from_current_tick_as_not_near() {
        let t0 = Instant::now();
        let mut bundle = BundleTiming::default();
        bundle.events.push_back(LiquidityEvent {
            at: t0,
            delta: 1_000_000,
            tick: 5000,
        });
        bundle.events.push_back(LiquidityEvent {
            at: t0 + Duration::from_secs(5),
            delta: -950_000,
            tick: 5000,
        });
        let result = detect_jit(&bundle, Address::ZERO, 100, 60, 0.8, 60, 10).unwrap();
        assert!(!result.is_near_current_tick);
    }
}
