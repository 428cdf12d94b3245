//! Cross-DEX detector (§4.4): for every pair quoted on ≥2 DEXes within a
//! chain's snapshot, find the lowest-buy/highest-sell pair and search for
//! the trade size maximizing net profit.
//!
//! `ChainPriceSnapshot` carries decimal-normalized price and a dollar
//! liquidity estimate but not raw reserves (V3 pools have none to speak
//! of). The optimal-trade-size search below works in USD-denominated
//! synthetic reserves, splitting each pool's two-sided `liquidity_usd`
//! evenly across the quoted and base sides — consistent with how
//! `liquidity_usd_estimate` defines that figure (`2 * one_side_value`).

use super::profit::{expected_slippage_usd, flash_loan_fee, gas_cost_usd, log_grid, v2_amount_out};
use crate::types::{ChainSpec, CrossDexPayload, Opportunity, PriceQuote};
use alloy::primitives::U256;

const GRID_STEPS: usize = 24;

fn dex_fee_fraction(chain: &ChainSpec, dex_name: &str) -> f64 {
    chain
        .dexes
        .get(dex_name)
        .map(|d| d.fee_fraction())
        .unwrap_or(0.003)
}

struct Candidate<'a> {
    dex_name: &'a str,
    quote: &'a PriceQuote,
}

fn select_buy_sell<'a>(
    quotes: &'a std::collections::HashMap<String, PriceQuote>,
    min_liquidity_usd: f64,
) -> Option<(Candidate<'a>, Candidate<'a>)> {
    let usable: Vec<Candidate> = quotes
        .iter()
        .filter(|(_, q)| q.is_valid() && q.liquidity_usd >= min_liquidity_usd)
        .map(|(name, q)| Candidate {
            dex_name: name.as_str(),
            quote: q,
        })
        .collect();
    if usable.len() < 2 {
        return None;
    }

    let min_price = usable.iter().map(|c| c.quote.price).fold(f64::MAX, f64::min);
    let max_price = usable.iter().map(|c| c.quote.price).fold(f64::MIN, f64::max);

    // Tie-break equal-price candidates on higher liquidity.
    let buy = usable
        .iter()
        .filter(|c| (c.quote.price - min_price).abs() < 1e-12)
        .max_by(|a, b| a.quote.liquidity_usd.partial_cmp(&b.quote.liquidity_usd).unwrap())?;
    let sell = usable
        .iter()
        .filter(|c| (c.quote.price - max_price).abs() < 1e-12)
        .max_by(|a, b| a.quote.liquidity_usd.partial_cmp(&b.quote.liquidity_usd).unwrap())?;

    if buy.dex_name == sell.dex_name {
        return None;
    }

    Some((
        Candidate {
            dex_name: buy.dex_name,
            quote: buy.quote,
        },
        Candidate {
            dex_name: sell.dex_name,
            quote: sell.quote,
        },
    ))
}

/// Best `(optimal_amount_usd, profit_usd_net)` over a logarithmic grid of
/// trade sizes, netting the flash-loan fee, gas cost, and expected
/// slippage (§4.4). Returns `(0.0, 0.0)` if every candidate is unprofitable
/// or either leg's synthetic reserve is zero.
fn optimize_trade_amount(
    chain: &ChainSpec,
    buy: &Candidate,
    sell: &Candidate,
) -> (f64, f64) {
    let buy_fee = dex_fee_fraction(chain, buy.dex_name);
    let sell_fee = dex_fee_fraction(chain, sell.dex_name);
    let flash_fee_fraction = chain.flash_loan.fee_fraction();

    // Two-sided USD liquidity split evenly: in-token half funds amount_in,
    // out-token half is the depth the trade walks into.
    let buy_reserve_in = buy.quote.liquidity_usd / 2.0;
    let buy_reserve_out = buy.quote.liquidity_usd / 2.0;
    let sell_reserve_in = sell.quote.liquidity_usd / 2.0;
    let sell_reserve_out = sell.quote.liquidity_usd / 2.0;

    if buy_reserve_in <= 0.0 || sell_reserve_in <= 0.0 {
        return (0.0, 0.0);
    }

    let max_trade = chain.trading.max_trade_size_usd;
    let min_trade = chain.trading.min_trade_usd;
    let native_price = chain.native_token.price_usd_fallback;
    let gas_usd = gas_cost_usd(
        chain.trading.gas_price_gwei,
        chain.trading.estimated_gas_limit,
        native_price,
    );

    let mut best_amount = 0.0;
    let mut best_profit = 0.0;

    for amount_in in log_grid(min_trade, max_trade, GRID_STEPS) {
        let leg1_out = v2_amount_out(amount_in, buy_reserve_in, buy_reserve_out, buy_fee);
        if leg1_out <= 0.0 {
            continue;
        }
        let leg2_out = v2_amount_out(leg1_out, sell_reserve_in, sell_reserve_out, sell_fee);
        if leg2_out <= 0.0 {
            continue;
        }
        let gross = leg2_out - amount_in;
        let fee = flash_loan_fee(amount_in, flash_fee_fraction);
        let slippage = expected_slippage_usd(amount_in, chain.trading.max_slippage_pct);
        let profit = gross - fee - gas_usd - slippage;
        if profit > best_profit {
            best_profit = profit;
            best_amount = amount_in;
        }
    }

    (best_amount, best_profit)
}

/// Runs the cross-DEX detector over one chain's snapshot, returning every
/// viable opportunity (§4.4).
pub fn detect_cross_dex(chain: &ChainSpec, snapshot: &crate::types::ChainPriceSnapshot) -> Vec<Opportunity> {
    let mut out = Vec::new();

    for (pair_key, quotes) in &snapshot.quotes {
        let Some((buy, sell)) = select_buy_sell(quotes, chain.trading.min_liquidity_usd) else {
            continue;
        };

        let spread_pct = (sell.quote.price - buy.quote.price) / buy.quote.price * 100.0;
        if !spread_pct.is_finite() || spread_pct < chain.trading.min_profit_pct {
            continue;
        }

        let (optimal_amount_usd, profit_usd_net) = optimize_trade_amount(chain, &buy, &sell);
        if profit_usd_net <= 0.0 {
            continue;
        }

        let liquidity_floor_usd = buy.quote.liquidity_usd.min(sell.quote.liquidity_usd);
        let payload = CrossDexPayload {
            pair_key: pair_key.clone(),
            buy_dex: buy.dex_name.to_string(),
            sell_dex: sell.dex_name.to_string(),
            buy_price: buy.quote.price,
            sell_price: sell.quote.price,
            spread_pct,
            optimal_amount: U256::from(optimal_amount_usd.max(0.0) as u128),
            liquidity_floor_usd,
        };

        out.push(Opportunity::cross_dex(
            chain.chain_id,
            payload,
            profit_usd_net,
            optimal_amount_usd,
            snapshot.block_number,
            snapshot.timestamp_ms,
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BridgeSpec, ChainSpec, DexKind, DexSpec, FlashLoanConfig, FlashLoanProvider, MonitoringParams,
        NativeToken, PoolKey, RpcConfig, TokenSpec, TradingParams, TriangularParams, V3Params,
    };
    use alloy::primitives::Address;
    use std::collections::HashMap;

    fn sample_chain() -> ChainSpec {
        let mut dexes = HashMap::new();
        dexes.insert(
            "uni".to_string(),
            DexSpec {
                name: "uni".into(),
                kind: DexKind::V2,
                router: Address::ZERO,
                factory: Address::ZERO,
                v2_fee: Some(0.003),
                v3_fee_tiers: vec![],
                tvl_rank: 1,
                enabled: true,
            },
        );
        dexes.insert(
            "sushi".to_string(),
            DexSpec {
                name: "sushi".into(),
                kind: DexKind::V2,
                router: Address::ZERO,
                factory: Address::ZERO,
                v2_fee: Some(0.0025),
                v3_fee_tiers: vec![],
                tvl_rank: 2,
                enabled: true,
            },
        );
        ChainSpec {
            chain_id: 1,
            name: "eth".into(),
            enabled: true,
            block_time_ms: 12_000,
            native_token: NativeToken {
                symbol: "ETH".into(),
                decimals: 18,
                wrapped: Address::ZERO,
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
            dexes,
            tokens: HashMap::from([(
                "WETH".to_string(),
                TokenSpec {
                    address: Address::ZERO,
                    decimals: 18,
                },
            )]),
            base_tokens: vec!["WETH".to_string()],
            trading: TradingParams {
                min_profit_pct: 0.1,
                max_slippage_pct: 0.0,
                gas_price_gwei: 0.0,
                estimated_gas_limit: 0,
                min_trade_usd: 100.0,
                max_trade_size_usd: 50_000.0,
                min_liquidity_usd: 1_000.0,
            },
            monitoring: MonitoringParams::default(),
            triangular: TriangularParams::default(),
            v3: V3Params::default(),
            flash_loan: FlashLoanConfig {
                providers: vec![FlashLoanProvider {
                    name: "aave".into(),
                    fee_fraction: 0.0025,
                }],
                preferred_provider: Some("aave".into()),
            },
            bridges: HashMap::<String, BridgeSpec>::new(),
        }
    }

    fn quote(dex: &str, price: f64, liquidity_usd: f64) -> PriceQuote {
        PriceQuote {
            price,
            price_usd: Some(1.0),
            dex_name: dex.into(),
            pool_address: Address::ZERO,
            liquidity_usd,
            block_number: 100,
            timestamp_ms: 100_000,
        }
    }

    #[test]
    fn detects_spread_above_threshold_with_positive_profit() {
        let chain = sample_chain();
        let key = PoolKey::new(Address::ZERO, Address::from([1u8; 20]), "uni", None);
        let mut snapshot = crate::types::ChainPriceSnapshot::empty(1);
        snapshot.block_number = 100;
        snapshot.timestamp_ms = 100_000;
        snapshot.insert(&key, "uni", quote("uni", 3000.0, 2_000_000.0));
        snapshot.insert(&key, "sushi", quote("sushi", 3030.0, 2_000_000.0));

        let opps = detect_cross_dex(&chain, &snapshot);
        assert_eq!(opps.len(), 1);
        let payload = opps[0].cross_dex.as_ref().unwrap();
        assert_eq!(payload.buy_dex, "uni");
        assert_eq!(payload.sell_dex, "sushi");
        assert!((payload.spread_pct - 1.0).abs() < 0.01);
        assert!(opps[0].profit_usd_net > 0.0);
    }

    #[test]
    fn single_dex_pair_produces_no_opportunity() {
        let chain = sample_chain();
        let key = PoolKey::new(Address::ZERO, Address::from([1u8; 20]), "uni", None);
        let mut snapshot = crate::types::ChainPriceSnapshot::empty(1);
        snapshot.insert(&key, "uni", quote("uni", 3000.0, 2_000_000.0));
        assert!(detect_cross_dex(&chain, &snapshot).is_empty());
    }

    #[test]
    fn below_liquidity_floor_is_excluded() {
        let chain = sample_chain();
        let key = PoolKey::new(Address::ZERO, Address::from([1u8; 20]), "uni", None);
        let mut snapshot = crate::types::ChainPriceSnapshot::empty(1);
        snapshot.insert(&key, "uni", quote("uni", 3000.0, 10.0));
        snapshot.insert(&key, "sushi", quote("sushi", 3030.0, 10.0));
        assert!(detect_cross_dex(&chain, &snapshot).is_empty());
    }

    #[test]
    fn below_min_profit_threshold_is_excluded() {
        let chain = sample_chain();
        let key = PoolKey::new(Address::ZERO, Address::from([1u8; 20]), "uni", None);
        let mut snapshot = crate::types::ChainPriceSnapshot::empty(1);
        snapshot.insert(&key, "uni", quote("uni", 3000.0, 2_000_000.0));
        snapshot.insert(&key, "sushi", quote("sushi", 3000.5, 2_000_000.0));
        assert!(detect_cross_dex(&chain, &snapshot).is_empty());
    }
}
