//! Tick-crossing tracker (§4.2, §8 scenario S7): watches a pool's current
//! tick across consecutive observations and emits a `TickCrossing` event
//! once it has moved by at least `tick_crossing_threshold` ticks, so
//! downstream detectors can react to large, sudden price moves instead
//! of re-deriving them from raw prices.

use crate::analyzer::tick_math::tick_to_price;
use crate::types::{CrossingDirection, TickCrossing};
use alloy::primitives::Address;
use std::collections::HashMap;

struct LastObservation {
    tick: i32,
    liquidity: u128,
}

pub struct TickTracker {
    last: HashMap<Address, LastObservation>,
}

impl TickTracker {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }

    /// Records the latest observed `(tick, liquidity)` for `pool`,
    /// returning a `TickCrossing` event only if `|Δticks| >= threshold`
    /// (default 10, §4.2).
    pub fn observe(
        &mut self,
        pool: Address,
        current_tick: i32,
        current_liquidity: u128,
        threshold: i32,
        decimals0: u8,
        decimals1: u8,
    ) -> Option<TickCrossing> {
        let previous = self.last.insert(
            pool,
            LastObservation {
                tick: current_tick,
                liquidity: current_liquidity,
            },
        );
        let previous = previous?;
        let delta = current_tick - previous.tick;
        if delta.abs() < threshold.max(1) {
            return None;
        }
        let direction = if delta > 0 {
            CrossingDirection::Up
        } else {
            CrossingDirection::Down
        };
        let price_before = tick_to_price(previous.tick, decimals0, decimals1);
        let price_after = tick_to_price(current_tick, decimals0, decimals1);
        let price_change_pct = if price_before > 0.0 {
            (price_after - price_before) / price_before * 100.0
        } else {
            0.0
        };
        Some(TickCrossing {
            pool_address: pool,
            ticks_crossed: delta.abs(),
            direction,
            price_change_pct,
        })
    }
}

impl Default for TickTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_yields_no_event() {
        let mut t = TickTracker::new();
        let pool = Address::ZERO;
        assert!(t.observe(pool, 100, 1, 10, 18, 18).is_none());
    }

    #[test]
    fn small_move_below_threshold_yields_no_event() {
        let mut t = TickTracker::new();
        let pool = Address::ZERO;
        t.observe(pool, 100, 1, 10, 18, 18);
        assert!(t.observe(pool, 105, 1, 10, 18, 18).is_none());
    }

    #[test]
    fn upward_move_at_or_above_threshold_reports_crossing_up() {
        let mut t = TickTracker::new();
        let pool = Address::ZERO;
        t.observe(pool, 100, 1, 10, 18, 18);
        let event = t.observe(pool, 160, 1, 10, 18, 18).unwrap();
        assert_eq!(event.ticks_crossed, 60);
        assert_eq!(event.direction, CrossingDirection::Up);
        assert!(event.price_change_pct > 0.0);
    }

    #[test]
    fn downward_move_reports_crossing_down() {
        let mut t = TickTracker::new();
        let pool = Address::ZERO;
        t.observe(pool, 100, 1, 10, 18, 18);
        let event = t.observe(pool, 40, 1, 10, 18, 18).unwrap();
        assert_eq!(event.direction, CrossingDirection::Down);
        assert!(event.price_change_pct < 0.0);
    }

    #[test]
    fn tracks_independent_pools_separately() {
        let mut t = TickTracker::new();
        let pool_a = Address::ZERO;
        let pool_b = Address::with_last_byte(1);
        t.observe(pool_a, 100, 1, 10, 18, 18);
        t.observe(pool_b, 200, 1, 10, 18, 18);
        assert!(t.observe(pool_b, 200, 1, 10, 18, 18).is_none());
        assert!(t.observe(pool_a, 115, 1, 10, 18, 18).is_some());
    }
}
