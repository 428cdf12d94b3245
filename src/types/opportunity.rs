//! Downstream event types: `Opportunity` and its variant payloads, plus
//! the V3 analyzer's `TickCrossing`/`JitLiquidity` signals (§4.2, §6).

use alloy::primitives::{Address, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpportunityKind {
    CrossDex,
    Triangular,
    CrossDexTriangular,
    CrossChain,
    V3FeeTier,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityKind::CrossDex => "cross_dex",
            OpportunityKind::Triangular => "triangular",
            OpportunityKind::CrossDexTriangular => "cross_dex_triangular",
            OpportunityKind::CrossChain => "cross_chain",
            OpportunityKind::V3FeeTier => "v3_fee_tier",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrossDexPayload {
    pub pair_key: String,
    pub buy_dex: String,
    pub sell_dex: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub spread_pct: f64,
    pub optimal_amount: U256,
    pub liquidity_floor_usd: f64,
}

#[derive(Debug, Clone)]
pub struct TriangularPayload {
    pub dex_names: Vec<String>,
    pub token_path: Vec<Address>,
    pub cycle_product: f64,
    pub optimal_amount: U256,
    pub is_cross_dex: bool,
}

#[derive(Debug, Clone)]
pub struct V3FeeTierPayload {
    pub pair_key: String,
    pub buy_tier: u32,
    pub sell_tier: u32,
    pub buy_price: f64,
    pub sell_price: f64,
    pub spread_pct: f64,
}

#[derive(Debug, Clone)]
pub struct CrossChainPayload {
    pub token_symbol: String,
    pub buy_chain_id: u64,
    pub sell_chain_id: u64,
    pub buy_price: f64,
    pub sell_price: f64,
    pub spread_pct: f64,
    pub bridge_cost_usd: f64,
}

/// Variant-tagged opportunity, emitted through the coordinator stream.
/// Value-type, never mutated after construction (§3).
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub kind: OpportunityKind,
    pub chain_id: Option<u64>,
    pub cross_dex: Option<CrossDexPayload>,
    pub triangular: Option<TriangularPayload>,
    pub v3_fee_tier: Option<V3FeeTierPayload>,
    pub cross_chain: Option<CrossChainPayload>,
    pub profit_usd_net: f64,
    pub trade_size_usd: f64,
    pub block_number: u64,
    pub timestamp_ms: u64,
}

impl Opportunity {
    pub fn cross_dex(
        chain_id: u64,
        payload: CrossDexPayload,
        profit_usd_net: f64,
        trade_size_usd: f64,
        block_number: u64,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            kind: OpportunityKind::CrossDex,
            chain_id: Some(chain_id),
            cross_dex: Some(payload),
            triangular: None,
            v3_fee_tier: None,
            cross_chain: None,
            profit_usd_net,
            trade_size_usd,
            block_number,
            timestamp_ms,
        }
    }

    pub fn triangular(
        chain_id: u64,
        payload: TriangularPayload,
        profit_usd_net: f64,
        trade_size_usd: f64,
        block_number: u64,
        timestamp_ms: u64,
    ) -> Self {
        let kind = if payload.is_cross_dex {
            OpportunityKind::CrossDexTriangular
        } else {
            OpportunityKind::Triangular
        };
        Self {
            kind,
            chain_id: Some(chain_id),
            cross_dex: None,
            triangular: Some(payload),
            v3_fee_tier: None,
            cross_chain: None,
            profit_usd_net,
            trade_size_usd,
            block_number,
            timestamp_ms,
        }
    }

    pub fn v3_fee_tier(
        chain_id: u64,
        payload: V3FeeTierPayload,
        profit_usd_net: f64,
        trade_size_usd: f64,
        block_number: u64,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            kind: OpportunityKind::V3FeeTier,
            chain_id: Some(chain_id),
            cross_dex: None,
            triangular: None,
            v3_fee_tier: Some(payload),
            cross_chain: None,
            profit_usd_net,
            trade_size_usd,
            block_number,
            timestamp_ms,
        }
    }

    pub fn cross_chain(
        payload: CrossChainPayload,
        profit_usd_net: f64,
        trade_size_usd: f64,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            kind: OpportunityKind::CrossChain,
            chain_id: None,
            cross_dex: None,
            triangular: None,
            v3_fee_tier: None,
            cross_chain: Some(payload),
            profit_usd_net,
            trade_size_usd,
            block_number: 0,
            timestamp_ms,
        }
    }

    /// Invariant (§8 property 7): profit_usd_net >= configured minimum.
    pub fn meets_min_profit(&self, min_profit_usd: f64) -> bool {
        self.profit_usd_net >= min_profit_usd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDirection {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct TickCrossing {
    pub pool_address: Address,
    pub ticks_crossed: i32,
    pub direction: CrossingDirection,
    pub price_change_pct: f64,
}

#[derive(Debug, Clone)]
pub struct JitLiquidity {
    pub pool_address: Address,
    pub tick: i32,
    pub add_magnitude: i128,
    pub remove_magnitude: i128,
    pub is_near_current_tick: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opportunity_meets_min_profit_is_inclusive() {
        let payload = CrossDexPayload {
            pair_key: "a-b".into(),
            buy_dex: "uni".into(),
            sell_dex: "sushi".into(),
            buy_price: 1.0,
            sell_price: 1.01,
            spread_pct: 1.0,
            optimal_amount: U256::from(1u64),
            liquidity_floor_usd: 1000.0,
        };
        let opp = Opportunity::cross_dex(1, payload, 50.0, 1000.0, 100, 0);
        assert!(opp.meets_min_profit(50.0));
        assert!(!opp.meets_min_profit(50.01));
    }

    #[test]
    fn triangular_cross_dex_uses_the_combined_kind() {
        let payload = TriangularPayload {
            dex_names: vec!["uni".into(), "sushi".into()],
            token_path: vec![Address::ZERO],
            cycle_product: 1.01,
            optimal_amount: U256::from(1u64),
            is_cross_dex: true,
        };
        let opp = Opportunity::triangular(1, payload, 10.0, 100.0, 1, 0);
        assert_eq!(opp.kind.as_str(), "cross_dex_triangular");
    }
}
