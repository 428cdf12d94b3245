//! `PriceQuote` and `ChainPriceSnapshot`.

use super::pool::PoolKey;
use alloy::primitives::Address;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PriceQuote {
    /// price of token_b per token_a, decimal-normalized
    pub price: f64,
    pub price_usd: Option<f64>,
    pub dex_name: String,
    pub pool_address: Address,
    pub liquidity_usd: f64,
    pub block_number: u64,
    pub timestamp_ms: u64,
}

impl PriceQuote {
    /// Invariant: price > 0 and finite.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Published by the chain worker after each block's fetch completes;
/// atomic replace (the whole map is swapped, never mutated in place).
#[derive(Debug, Clone)]
pub struct ChainPriceSnapshot {
    pub chain_id: u64,
    /// pair_key -> dex_name -> quote
    pub quotes: HashMap<String, HashMap<String, PriceQuote>>,
    pub block_number: u64,
    pub timestamp_ms: u64,
}

impl ChainPriceSnapshot {
    pub fn empty(chain_id: u64) -> Self {
        Self {
            chain_id,
            quotes: HashMap::new(),
            block_number: 0,
            timestamp_ms: 0,
        }
    }

    pub fn insert(&mut self, key: &PoolKey, dex_name: &str, quote: PriceQuote) {
        self.quotes
            .entry(key.pair_key())
            .or_default()
            .insert(dex_name.to_string(), quote);
    }

    pub fn dexes_for_pair(&self, pair_key: &str) -> Option<&HashMap<String, PriceQuote>> {
        self.quotes.get(pair_key)
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_quote() -> PriceQuote {
        PriceQuote {
            price: 3000.0,
            price_usd: Some(3000.0),
            dex_name: "uni".into(),
            pool_address: Address::ZERO,
            liquidity_usd: 1_000_000.0,
            block_number: 10,
            timestamp_ms: 1000,
        }
    }

    #[test]
    fn invalid_when_non_finite_or_non_positive() {
        let mut q = sample_quote();
        q.price = f64::NAN;
        assert!(!q.is_valid());
        q.price = 0.0;
        assert!(!q.is_valid());
        q.price = -1.0;
        assert!(!q.is_valid());
    }

    #[test]
    fn snapshot_insert_and_lookup_round_trips() {
        let key = PoolKey::new(Address::ZERO, Address::from([9u8; 20]), "uni", None);
        let mut snap = ChainPriceSnapshot::empty(1);
        snap.insert(&key, "uni", sample_quote());
        let dexes = snap.dexes_for_pair(&key.pair_key()).unwrap();
        assert!(dexes.contains_key("uni"));
    }
}
