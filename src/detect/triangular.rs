//! Triangular detector (§4.5): directed weighted graph per pair (spanning
//! every DEX that quotes it), negative-cycle search bounded by
//! `max_path_length`, cross-DEX router-match enforcement.
//!
//! Edge weight uses the standard FX-arbitrage convention
//! `weight = -ln(rate · (1 − fee))` so that a *negative*-weight cycle sum
//! corresponds to a cycle whose product of rates exceeds 1 — matching the
//! "negative-weight cycle indicates a profitable cycle" framing; the
//! spec's literal `log(rate)` (unnegated) would instead make profitable
//! cycles positive-weight, so the sign is a deliberate fix rather than a
//! literal transcription.

use super::profit::{flash_loan_fee, log_grid, v2_amount_out};
use crate::types::{ChainSpec, ChainPriceSnapshot, Opportunity, PoolKey, TriangularPayload};
use alloy::primitives::{Address, U256};
use std::collections::{HashMap, HashSet};

const GRID_STEPS: usize = 16;

fn dex_fee_fraction(chain: &ChainSpec, dex_name: &str) -> f64 {
    chain
        .dexes
        .get(dex_name)
        .map(|d| d.fee_fraction())
        .unwrap_or(0.003)
}

#[derive(Clone)]
struct Edge {
    to: Address,
    weight: f64,
    dex_name: String,
    liquidity_usd: f64,
}

fn build_graph(chain: &ChainSpec, snapshot: &ChainPriceSnapshot) -> HashMap<Address, Vec<Edge>> {
    let mut graph: HashMap<Address, Vec<Edge>> = HashMap::new();
    let tokens: Vec<(&String, Address)> = chain.tokens.iter().map(|(s, t)| (s, t.address)).collect();

    for i in 0..tokens.len() {
        for j in (i + 1)..tokens.len() {
            let (_, addr_i) = tokens[i];
            let (_, addr_j) = tokens[j];
            let key = PoolKey::new(addr_i, addr_j, "_", None);
            let pair_key = key.pair_key();
            let Some(dexes) = snapshot.dexes_for_pair(&pair_key) else {
                continue;
            };
            for (dex_name, quote) in dexes {
                if !quote.is_valid() {
                    continue;
                }
                let fee = dex_fee_fraction(chain, dex_name);
                let rate_fwd = quote.price * (1.0 - fee);
                let rate_rev = (1.0 / quote.price) * (1.0 - fee);
                if rate_fwd <= 0.0 || rate_rev <= 0.0 {
                    continue;
                }
                graph.entry(key.token_a).or_default().push(Edge {
                    to: key.token_b,
                    weight: -rate_fwd.ln(),
                    dex_name: dex_name.clone(),
                    liquidity_usd: quote.liquidity_usd,
                });
                graph.entry(key.token_b).or_default().push(Edge {
                    to: key.token_a,
                    weight: -rate_rev.ln(),
                    dex_name: dex_name.clone(),
                    liquidity_usd: quote.liquidity_usd,
                });
            }
        }
    }
    graph
}

/// Exhaustive DFS from `start`, bounded by `max_len` edges, collecting
/// every closed negative-weight cycle (§4.5).
fn find_cycles(graph: &HashMap<Address, Vec<Edge>>, start: Address, max_len: usize) -> Vec<Vec<Edge>> {
    let mut results = Vec::new();
    let mut path: Vec<Edge> = Vec::new();
    let mut visited: HashSet<Address> = HashSet::from([start]);
    dfs_visit(graph, start, start, max_len, 0.0, &mut path, &mut visited, &mut results);
    results
}

#[allow(clippy::too_many_arguments)]
fn dfs_visit(
    graph: &HashMap<Address, Vec<Edge>>,
    start: Address,
    current: Address,
    max_len: usize,
    running_weight: f64,
    path: &mut Vec<Edge>,
    visited: &mut HashSet<Address>,
    results: &mut Vec<Vec<Edge>>,
) {
    let Some(edges) = graph.get(&current) else {
        return;
    };

    if path.len() >= 2 {
        for e in edges {
            if e.to == start && running_weight + e.weight < 0.0 {
                let mut full = path.clone();
                full.push(e.clone());
                results.push(full);
            }
        }
    }

    if path.len() >= max_len {
        return;
    }
    // Abandon a branch whose running sum is already non-negative and has
    // no remaining budget to recover (§4.5 pruning rule).
    if running_weight >= 0.0 && path.len() + 1 >= max_len {
        return;
    }

    for e in edges {
        if e.to == start || visited.contains(&e.to) {
            continue;
        }
        visited.insert(e.to);
        path.push(e.clone());
        dfs_visit(graph, start, e.to, max_len, running_weight + e.weight, path, visited, results);
        path.pop();
        visited.remove(&e.to);
    }
}

fn optimize_cycle_amount(chain: &ChainSpec, cycle: &[Edge]) -> (f64, f64) {
    let max_amount = chain.triangular.max_trade_size_usd;
    let floor = (max_amount / 50.0).max(1.0);
    let min_amount = chain.trading.min_trade_usd.max(floor).min(max_amount);
    let flash_fee_fraction = chain.flash_loan.fee_fraction();

    let mut best_amount = 0.0;
    let mut best_profit = 0.0;

    for amount_in in log_grid(min_amount, max_amount, GRID_STEPS) {
        let mut current = amount_in;
        let mut ok = true;
        for edge in cycle {
            let fee = dex_fee_fraction(chain, &edge.dex_name);
            let reserve_in = edge.liquidity_usd / 2.0;
            let reserve_out = edge.liquidity_usd / 2.0;
            current = v2_amount_out(current, reserve_in, reserve_out, fee);
            if current <= 0.0 {
                ok = false;
                break;
            }
        }
        if !ok {
            continue;
        }
        let fee_once = flash_loan_fee(amount_in, flash_fee_fraction);
        let profit = current - amount_in - fee_once;
        if profit > best_profit {
            best_profit = profit;
            best_amount = amount_in;
        }
    }

    (best_amount, best_profit)
}

/// Runs the triangular detector for one chain's snapshot (§4.5).
pub fn detect_triangular(chain: &ChainSpec, snapshot: &ChainPriceSnapshot) -> Vec<Opportunity> {
    if !chain.triangular.enabled {
        return Vec::new();
    }
    let graph = build_graph(chain, snapshot);
    let mut out = Vec::new();

    for base_symbol in &chain.base_tokens {
        let Some(base_addr) = chain.token_address(base_symbol) else {
            continue;
        };
        let cycles = find_cycles(&graph, base_addr, chain.triangular.max_path_length);

        for cycle in cycles {
            if cycle
                .iter()
                .any(|e| e.liquidity_usd < chain.triangular.min_liquidity_usd)
            {
                continue;
            }

            let dex_names: Vec<String> = {
                let mut seen = Vec::new();
                for e in &cycle {
                    if !seen.contains(&e.dex_name) {
                        seen.push(e.dex_name.clone());
                    }
                }
                seen
            };
            let is_cross_dex = dex_names.len() > 1;

            if is_cross_dex {
                let routers: HashSet<Address> = dex_names
                    .iter()
                    .filter_map(|name| chain.dexes.get(name).map(|d| d.router))
                    .collect();
                if routers.len() > 1 {
                    // "cross-DEX triangular arbitrage not supported" — reject silently,
                    // a single flash-loan callback can't straddle multiple routers.
                    continue;
                }
            }

            let total_weight: f64 = cycle.iter().map(|e| e.weight).sum();
            let cycle_product = (-total_weight).exp();

            let (optimal_amount_usd, profit_usd_net) = optimize_cycle_amount(chain, &cycle);
            if profit_usd_net <= 0.0 {
                continue;
            }

            let mut token_path = vec![base_addr];
            token_path.extend(cycle.iter().map(|e| e.to));

            let payload = TriangularPayload {
                dex_names,
                token_path,
                cycle_product,
                optimal_amount: U256::from(optimal_amount_usd.max(0.0) as u128),
                is_cross_dex,
            };

            out.push(Opportunity::triangular(
                chain.chain_id,
                payload,
                profit_usd_net,
                optimal_amount_usd,
                snapshot.block_number,
                snapshot.timestamp_ms,
            ));
        }
    }

    out
}
