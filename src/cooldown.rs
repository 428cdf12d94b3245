//! Route-level cooldown: suppresses a `(pair, buy_dex, sell_dex)` route
//! after a failed execution with escalating backoff, so a structurally
//! dead spread (e.g. a same-DEX fee-tier gap that never closes) quickly
//! reaches its cap instead of being retried every block, while a
//! transient failure recovers in a handful of blocks.
//!
//! Generalized from the teacher's `arbitrage/cooldown.rs`: the route key
//! used a closed `DexType` enum, generalized here to the DEX-name string
//! the rest of this crate's config/detector layer uses (§3's DEX model
//! moved from a closed enum to `DexKind` + configured name).

use std::collections::HashMap;
use tracing::{debug, info};

type RouteKey = (String, String, String);

struct CooldownEntry {
    last_failed_block: u64,
    cooldown_blocks: u64,
    failure_count: u32,
}

const ESCALATION_FACTOR: u64 = 5;
const DEFAULT_MAX_COOLDOWN: u64 = 1800;

/// Route-level cooldown tracker with escalating backoff.
pub struct RouteCooldown {
    entries: HashMap<RouteKey, CooldownEntry>,
    initial_cooldown: u64,
    max_cooldown: u64,
}

impl RouteCooldown {
    /// `initial_cooldown` = blocks to suppress after the first failure
    /// (0 disables cooldown entirely).
    pub fn new(initial_cooldown: u64) -> Self {
        Self {
            entries: HashMap::new(),
            initial_cooldown,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
        }
    }

    pub fn is_cooled_down(&self, pair: &str, buy_dex: &str, sell_dex: &str, current_block: u64) -> bool {
        if self.initial_cooldown == 0 {
            return false;
        }
        let key = (pair.to_string(), buy_dex.to_string(), sell_dex.to_string());
        self.entries
            .get(&key)
            .map(|entry| current_block < entry.last_failed_block + entry.cooldown_blocks)
            .unwrap_or(false)
    }

    /// Escalation: `initial × 5^(failures-1)`, capped at `max_cooldown`.
    pub fn record_failure(&mut self, pair: &str, buy_dex: &str, sell_dex: &str, block: u64) {
        if self.initial_cooldown == 0 {
            return;
        }
        let key = (pair.to_string(), buy_dex.to_string(), sell_dex.to_string());
        let entry = self.entries.entry(key).or_insert_with(|| CooldownEntry {
            last_failed_block: block,
            cooldown_blocks: 0,
            failure_count: 0,
        });
        entry.failure_count += 1;
        entry.last_failed_block = block;
        let escalated = self
            .initial_cooldown
            .saturating_mul(ESCALATION_FACTOR.saturating_pow(entry.failure_count.saturating_sub(1)));
        entry.cooldown_blocks = escalated.min(self.max_cooldown);

        debug!(
            pair,
            buy_dex, sell_dex, failure_count = entry.failure_count, cooldown_blocks = entry.cooldown_blocks,
            "route entered cooldown"
        );
    }

    /// Success removes the cooldown entry entirely (instant reset).
    pub fn record_success(&mut self, pair: &str, buy_dex: &str, sell_dex: &str) {
        let key = (pair.to_string(), buy_dex.to_string(), sell_dex.to_string());
        if self.entries.remove(&key).is_some() {
            info!(pair, buy_dex, sell_dex, "route cooldown reset after success");
        }
    }

    /// Removes expired entries; call periodically to bound memory.
    pub fn cleanup(&mut self, current_block: u64) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| current_block < entry.last_failed_block + entry.cooldown_blocks);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "route cooldown cleanup");
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cooldown_initially() {
        let cd = RouteCooldown::new(10);
        assert!(!cd.is_cooled_down("WETH/USDC", "uni", "sushi", 100));
    }

    #[test]
    fn cooldown_after_failure_expires_on_schedule() {
        let mut cd = RouteCooldown::new(10);
        cd.record_failure("WETH/USDC", "uni", "sushi", 100);
        assert!(cd.is_cooled_down("WETH/USDC", "uni", "sushi", 109));
        assert!(!cd.is_cooled_down("WETH/USDC", "uni", "sushi", 110));
    }

    #[test]
    fn escalating_backoff_caps_at_max() {
        let mut cd = RouteCooldown::new(10);
        cd.record_failure("WBTC/USDC", "uni", "sushi", 100);
        assert!(!cd.is_cooled_down("WBTC/USDC", "uni", "sushi", 110));
        cd.record_failure("WBTC/USDC", "uni", "sushi", 200);
        assert!(cd.is_cooled_down("WBTC/USDC", "uni", "sushi", 249));
        assert!(!cd.is_cooled_down("WBTC/USDC", "uni", "sushi", 250));
        for block in [300u64, 600, 2000, 4000] {
            cd.record_failure("WBTC/USDC", "uni", "sushi", block);
        }
        assert_eq!(
            cd.entries
                .get(&("WBTC/USDC".to_string(), "uni".to_string(), "sushi".to_string()))
                .unwrap()
                .cooldown_blocks,
            DEFAULT_MAX_COOLDOWN
        );
    }

    #[test]
    fn success_resets_cooldown() {
        let mut cd = RouteCooldown::new(10);
        cd.record_failure("WETH/USDC", "uni", "sushi", 100);
        assert!(cd.is_cooled_down("WETH/USDC", "uni", "sushi", 101));
        cd.record_success("WETH/USDC", "uni", "sushi");
        assert!(!cd.is_cooled_down("WETH/USDC", "uni", "sushi", 101));
        assert_eq!(cd.active_count(), 0);
    }

    #[test]
    fn disabled_when_zero() {
        let mut cd = RouteCooldown::new(0);
        cd.record_failure("WETH/USDC", "uni", "sushi", 100);
        assert!(!cd.is_cooled_down("WETH/USDC", "uni", "sushi", 100));
    }

    #[test]
    fn cleanup_removes_only_expired_entries() {
        let mut cd = RouteCooldown::new(10);
        cd.record_failure("WETH/USDC", "uni", "sushi", 100);
        cd.record_failure("WBTC/USDC", "uni", "sushi", 200);
        assert_eq!(cd.active_count(), 2);
        cd.cleanup(111);
        assert_eq!(cd.active_count(), 1);
        cd.cleanup(211);
        assert_eq!(cd.active_count(), 0);
    }
}
