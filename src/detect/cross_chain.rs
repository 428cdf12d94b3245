//! Cross-chain detector (§4.6): for each token in the `cross_chain_tokens`
//! registry, compares its USD price across every chain with a fresh
//! snapshot and emits a bridge-cost-netted spread opportunity.

use crate::types::{ChainPriceSnapshot, ChainSpec, CrossChainConfig, CrossChainPayload, Opportunity, PoolKey};
use alloy::primitives::Address;
use std::collections::HashMap;

/// Fixed reference trade size used for the profit estimate (§4.6).
const REFERENCE_TRADE_SIZE_USD: f64 = 10_000.0;

/// Best-effort USD price of `token_addr` on `chain`, found by scanning
/// every pair that token appears in within `snapshot` and taking the
/// quote with the largest liquidity, rejecting quotes older than
/// `max_age_ms`. Mirrors the triangular detector's pair-reconstruction
/// approach since `ChainPriceSnapshot` only indexes by pair, not token.
fn token_usd_price(
    chain: &ChainSpec,
    snapshot: &ChainPriceSnapshot,
    token_addr: Address,
    now_ms: u64,
    max_age_ms: u64,
) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None; // (liquidity_usd, usd_price)

    for other in chain.tokens.values() {
        if other.address == token_addr {
            continue;
        }
        let key = PoolKey::new(token_addr, other.address, "_", None);
        let Some(dexes) = snapshot.dexes_for_pair(&key.pair_key()) else {
            continue;
        };
        for quote in dexes.values() {
            if !quote.is_valid() {
                continue;
            }
            let age_ms = now_ms.saturating_sub(quote.timestamp_ms);
            if age_ms > max_age_ms {
                continue;
            }
            let Some(price_usd_b) = quote.price_usd else {
                continue;
            };
            let usd_price = if key.token_a == token_addr {
                quote.price * price_usd_b
            } else {
                price_usd_b
            };
            if usd_price <= 0.0 {
                continue;
            }
            if best.map(|(l, _)| quote.liquidity_usd > l).unwrap_or(true) {
                best = Some((quote.liquidity_usd, usd_price));
            }
        }
    }

    best.map(|(_, p)| p)
}

/// Runs the cross-chain detector across every chain's latest snapshot
/// (§4.6), returning opportunities sorted by descending profit.
pub fn detect_cross_chain(
    config: &CrossChainConfig,
    chains: &HashMap<u64, ChainSpec>,
    snapshots: &HashMap<u64, ChainPriceSnapshot>,
    now_ms: u64,
) -> Vec<Opportunity> {
    if !config.enabled {
        return Vec::new();
    }

    let mut out = Vec::new();

    for (symbol, entry) in &config.cross_chain_tokens {
        let mut priced: Vec<(u64, f64)> = Vec::new();
        for (&chain_id, &token_addr) in &entry.chains {
            let Some(chain) = chains.get(&chain_id) else {
                continue;
            };
            let Some(snapshot) = snapshots.get(&chain_id) else {
                continue;
            };
            if let Some(price) = token_usd_price(chain, snapshot, token_addr, now_ms, config.max_price_age_ms) {
                priced.push((chain_id, price));
            }
        }

        if priced.len() < 2 {
            continue;
        }

        priced.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        let (buy_chain_id, buy_price) = priced[0];
        let (sell_chain_id, sell_price) = *priced.last().unwrap();

        if buy_chain_id == sell_chain_id || buy_price <= 0.0 {
            continue;
        }

        let spread_pct = (sell_price - buy_price) / buy_price * 100.0;
        if !spread_pct.is_finite() || spread_pct < config.min_spread_pct {
            continue;
        }

        let buy_name = chains.get(&buy_chain_id).map(|c| c.name.clone()).unwrap_or_default();
        let sell_name = chains.get(&sell_chain_id).map(|c| c.name.clone()).unwrap_or_default();
        let bridge = config.bridge_cost(&buy_name, &sell_name);

        let profit_usd_net = REFERENCE_TRADE_SIZE_USD * spread_pct / 100.0 - bridge.cost_usd;
        if profit_usd_net < config.min_profit_usd {
            continue;
        }

        let payload = CrossChainPayload {
            token_symbol: symbol.clone(),
            buy_chain_id,
            sell_chain_id,
            buy_price,
            sell_price,
            spread_pct,
            bridge_cost_usd: bridge.cost_usd,
        };

        out.push(Opportunity::cross_chain(
            payload,
            profit_usd_net,
            REFERENCE_TRADE_SIZE_USD,
            now_ms,
        ));
    }

    out.sort_by(|a, b| b.profit_usd_net.partial_cmp(&a.profit_usd_net).unwrap());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BridgeSpec, ChainSpec, CrossChainBridgeCost, CrossChainTokenEntry, DexSpec, FlashLoanConfig,
        MonitoringParams, NativeToken, PriceQuote, RpcConfig, TokenSpec, TradingParams, TriangularParams,
        V3Params,
    };
    use std::collections::HashMap as Map;

    fn token(n: u8) -> Address {
        Address::from([n; 20])
    }

    fn chain_with(id: u64, name: &str, usdc: Address, weth: Address) -> ChainSpec {
        let mut tokens = Map::new();
        tokens.insert("USDC".to_string(), TokenSpec { address: usdc, decimals: 6 });
        tokens.insert("WETH".to_string(), TokenSpec { address: weth, decimals: 18 });
        ChainSpec {
            chain_id: id,
            name: name.into(),
            enabled: true,
            block_time_ms: 2000,
            native_token: NativeToken {
                symbol: "ETH".into(),
                decimals: 18,
                wrapped: weth,
                price_usd_fallback: 3300.0,
            },
            rpc: RpcConfig {
                http: vec!["http://x".into()],
                ws: vec![],
                max_requests_per_minute: 300,
                request_delay_ms: 50,
                retry_attempts: 3,
                retry_delay_ms: 250,
            },
            dexes: Map::<String, DexSpec>::new(),
            tokens,
            base_tokens: vec!["WETH".to_string()],
            trading: TradingParams {
                min_profit_pct: 0.1,
                max_slippage_pct: 0.5,
                gas_price_gwei: 30.0,
                estimated_gas_limit: 300_000,
                min_trade_usd: 100.0,
                max_trade_size_usd: 50_000.0,
                min_liquidity_usd: 1_000.0,
            },
            monitoring: MonitoringParams::default(),
            triangular: TriangularParams::default(),
            v3: V3Params::default(),
            flash_loan: FlashLoanConfig::default(),
            bridges: Map::<String, BridgeSpec>::new(),
        }
    }

    fn usd_quote(usd_price_of_token_b: f64, liquidity_usd: f64, timestamp_ms: u64) -> PriceQuote {
        PriceQuote {
            price: 1.0,
            price_usd: Some(usd_price_of_token_b),
            dex_name: "uni".into(),
            pool_address: Address::ZERO,
            liquidity_usd,
            block_number: 10,
            timestamp_ms,
        }
    }

    #[test]
    fn detects_cross_chain_spread_net_of_bridge_cost() {
        let usdc_a = token(10);
        let weth_a = token(1);
        let usdc_b = token(10); // same logical token, different chain
        let weth_b = token(2);

        let chain_a = chain_with(1, "polygon", usdc_a, weth_a);
        let chain_b = chain_with(2, "arbitrum", usdc_b, weth_b);

        let key_a = PoolKey::new(usdc_a, weth_a, "_", None);
        let key_b = PoolKey::new(usdc_b, weth_b, "_", None);

        let mut snap_a = ChainPriceSnapshot::empty(1);
        snap_a.timestamp_ms = 1_000;
        // USDC is token_a (smaller address byte [10] vs weth [1]? need usdc addr > weth addr to be token_b)
        let is_usdc_token_b_a = key_a.token_b == usdc_a;
        let price_field = if is_usdc_token_b_a { 0.999 } else { 1.0 / 0.999 };
        snap_a.insert(&key_a, "uni", usd_quote(price_field, 5_000_000.0, 1_000));

        let mut snap_b = ChainPriceSnapshot::empty(2);
        snap_b.timestamp_ms = 1_500;
        let is_usdc_token_b_b = key_b.token_b == usdc_b;
        let price_field_b = if is_usdc_token_b_b { 1.004 } else { 1.0 / 1.004 };
        snap_b.insert(&key_b, "uni", usd_quote(price_field_b, 5_000_000.0, 1_500));

        let mut chains = Map::new();
        chains.insert(1, chain_a);
        chains.insert(2, chain_b);
        let mut snapshots = Map::new();
        snapshots.insert(1, snap_a);
        snapshots.insert(2, snap_b);

        let mut config = CrossChainConfig {
            enabled: true,
            min_profit_usd: 1.0,
            max_price_age_ms: 5_000,
            min_spread_pct: 0.01,
            cross_chain_tokens: Map::new(),
            bridge_costs: Map::new(),
        };
        config.cross_chain_tokens.insert(
            "USDC".to_string(),
            CrossChainTokenEntry {
                chains: HashMap::from([(1u64, usdc_a), (2u64, usdc_b)]),
            },
        );
        let mut to_map = Map::new();
        to_map.insert(
            "arbitrum".to_string(),
            CrossChainBridgeCost {
                cost_usd: 3.0,
                minutes: 20.0,
            },
        );
        config.bridge_costs.insert("polygon".to_string(), to_map);

        let opps = detect_cross_chain(&config, &chains, &snapshots, 2_000);
        assert_eq!(opps.len(), 1);
        let payload = opps[0].cross_chain.as_ref().unwrap();
        assert_eq!(payload.buy_chain_id, 1);
        assert_eq!(payload.sell_chain_id, 2);
        assert!((payload.spread_pct - 0.5).abs() < 0.05, "spread_pct={}", payload.spread_pct);
        assert!((opps[0].profit_usd_net - 47.0).abs() < 5.0, "profit={}", opps[0].profit_usd_net);
    }

    #[test]
    fn never_emits_when_buy_and_sell_chain_match() {
        let config = CrossChainConfig {
            enabled: true,
            ..CrossChainConfig::default()
        };
        let chains = Map::new();
        let snapshots = Map::new();
        assert!(detect_cross_chain(&config, &chains, &snapshots, 0).is_empty());
    }

    #[test]
    fn disabled_config_yields_nothing() {
        let config = CrossChainConfig::default();
        let chains = Map::new();
        let snapshots = Map::new();
        assert!(detect_cross_chain(&config, &chains, &snapshots, 0).is_empty());
    }
}
