//! Chain worker (W, §4.7): owns one chain's transport pool, V3 analyzer,
//! price fetcher, and route cooldown. On start it discovers every
//! configured DEX's pools once via the factory contracts, then on every
//! new block fetches their state, builds the chain's price snapshot, runs
//! the in-chain detectors, and forwards opportunities to the coordinator.

use crate::analyzer::fee_tier::{build_depth_profile, detect_fee_tier_arbitrage, select_optimal_tier, FeeTierQuote};
use crate::analyzer::swap_sim::calculate_swap_output_with_ticks;
use crate::analyzer::tick_math::sqrt_price_x96_to_price;
use crate::analyzer::{fetch_tick_spacing, fetch_tick_window, V3Analyzer};
use crate::contracts::{IUniswapV2Factory, UniswapV3Factory};
use crate::cooldown::RouteCooldown;
use crate::detect::{detect_cross_dex, detect_triangular};
use crate::error::CoreResult;
use crate::price_fetcher::{fetch_batch, FetchTarget, PriceFetcher, QuoteContext};
use crate::transport::TransportPool;
use crate::types::{ChainPriceSnapshot, ChainSpec, Opportunity, PoolKey, PoolState, Tick, V3FeeTierPayload};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, watch, Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

/// Background HTTP self-heal probe cadence (§4.1): matches
/// `HttpPool::self_heal_once`'s own doc ("run every 5 minutes").
const SELF_HEAL_INTERVAL_SECS: u64 = 300;

/// Minimum fraction of `fee_tier::offsets()` levels a pool's tick window
/// must cover (both directions) before a fee-tier opportunity backed by it
/// is trusted; below this the cached tick slice is too thin a sample of
/// the pool's real depth to act on.
const MIN_DEPTH_SCORE: f64 = 0.25;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Running counters surfaced by the coordinator for observability (§4.8).
#[derive(Debug, Default)]
pub struct ChainWorkerStats {
    pub blocks_processed: AtomicU64,
    pub opportunities_found: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub last_fetch_duration_ms: AtomicU64,
}

impl ChainWorkerStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.blocks_processed.load(Ordering::Relaxed),
            self.opportunities_found.load(Ordering::Relaxed),
            self.fetch_failures.load(Ordering::Relaxed),
            self.last_fetch_duration_ms.load(Ordering::Relaxed),
        )
    }
}

/// One chain's monitoring pipeline. Everything it owns (`TransportPool`,
/// `V3Analyzer`) is exclusive to this chain (§5: "no cross-chain sharing
/// below the coordinator").
pub struct ChainWorker {
    chain: ChainSpec,
    transport: TransportPool,
    analyzer: V3Analyzer,
    fetcher: Mutex<PriceFetcher>,
    cooldown: Mutex<RouteCooldown>,
    targets: RwLock<Vec<FetchTarget>>,
    contexts: RwLock<HashMap<Address, QuoteContext>>,
    /// `tickSpacing()` per V3 pool, resolved once at discovery so the
    /// per-block path never has to guess it (§4.2).
    tick_spacings: RwLock<HashMap<Address, i32>>,
    stats: ChainWorkerStats,
    shutdown: Arc<Notify>,
}

impl ChainWorker {
    pub fn new(chain: ChainSpec) -> CoreResult<Self> {
        chain.validate().map_err(|message| crate::error::CoreError::ConfigError { message })?;
        let transport = TransportPool::new(&chain.rpc)?;
        let analyzer = V3Analyzer::new(
            chain.v3.tick_window,
            chain.v3.cache_max_age_secs,
            chain.v3.jit_window_secs,
            chain.v3.jit_threshold,
            chain.v3.tick_crossing_threshold,
        );
        const DEFAULT_INITIAL_COOLDOWN_BLOCKS: u64 = 10;
        let chain_id = chain.chain_id;
        Ok(Self {
            chain,
            transport,
            analyzer,
            fetcher: Mutex::new(PriceFetcher::new(chain_id, 2)),
            cooldown: Mutex::new(RouteCooldown::new(DEFAULT_INITIAL_COOLDOWN_BLOCKS)),
            targets: RwLock::new(Vec::new()),
            contexts: RwLock::new(HashMap::new()),
            tick_spacings: RwLock::new(HashMap::new()),
            stats: ChainWorkerStats::default(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn stats(&self) -> &ChainWorkerStats {
        &self.stats
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    /// `None` for a base token the caller has no pre-priced quote for yet —
    /// falls back to the static table inside `quote_from_pool_state`.
    fn known_price_hint(&self, symbol: &str) -> Option<f64> {
        if symbol == self.chain.native_token.symbol {
            Some(self.chain.native_token.price_usd_fallback)
        } else {
            None
        }
    }

    /// Calls `getPair`/`getPool` on every enabled DEX's factory for every
    /// unordered token pair, once at startup, building the `FetchTarget`
    /// list the per-block multicall batches against. Pools that don't
    /// exist (zero address) are skipped rather than treated as an error —
    /// most token/DEX combinations simply have no pool.
    pub async fn discover_pools(&self) -> CoreResult<()> {
        let tokens: Vec<(&String, &crate::types::TokenSpec)> = self.chain.tokens.iter().collect();
        let mut targets = Vec::new();
        let mut contexts = HashMap::new();
        let mut tick_spacings = HashMap::new();

        for (dex_name, dex) in &self.chain.dexes {
            if !dex.enabled {
                continue;
            }
            for i in 0..tokens.len() {
                for j in (i + 1)..tokens.len() {
                    let (sym_i, tok_i) = tokens[i];
                    let (sym_j, tok_j) = tokens[j];
                    let ((sym_lo, tok_lo), (_sym_hi, tok_hi)) = if tok_i.address <= tok_j.address {
                        ((sym_i, tok_i), (sym_j, tok_j))
                    } else {
                        ((sym_j, tok_j), (sym_i, tok_i))
                    };

                    if dex.kind.is_v2() {
                        let factory = dex.factory;
                        let (token_a, token_b) = (tok_lo.address, tok_hi.address);
                        let pool = self
                            .transport
                            .http
                            .with_retry(|provider| async move {
                                let contract = IUniswapV2Factory::new(factory, provider);
                                contract.getPair(token_a, token_b).call().await.map_err(|e| e.to_string())
                            })
                            .await?;
                        if pool != Address::ZERO {
                            let key = PoolKey::new(token_a, token_b, dex_name.clone(), None);
                            targets.push(FetchTarget::V2 {
                                pool,
                                key,
                                token0_decimals: tok_lo.decimals,
                                token1_decimals: tok_hi.decimals,
                            });
                            contexts.insert(
                                pool,
                                QuoteContext {
                                    dex_name: dex_name.clone(),
                                    token_a_symbol: sym_lo.clone(),
                                    known_price_usd_a: self.known_price_hint(sym_lo),
                                },
                            );
                        }
                    } else if dex.kind.is_v3() {
                        for &fee in &dex.v3_fee_tiers {
                            let factory = dex.factory;
                            let (token_a, token_b) = (tok_lo.address, tok_hi.address);
                            let pool = self
                                .transport
                                .http
                                .with_retry(|provider| async move {
                                    let contract = UniswapV3Factory::new(factory, provider);
                                    contract
                                        .getPool(token_a, token_b, fee)
                                        .call()
                                        .await
                                        .map_err(|e| e.to_string())
                                })
                                .await?;
                            if pool != Address::ZERO {
                                let key = PoolKey::new(token_a, token_b, dex_name.clone(), Some(fee));
                                targets.push(FetchTarget::V3 {
                                    pool,
                                    key,
                                    fee_tier: fee,
                                    token0_decimals: tok_lo.decimals,
                                    token1_decimals: tok_hi.decimals,
                                });
                                contexts.insert(
                                    pool,
                                    QuoteContext {
                                        dex_name: dex_name.clone(),
                                        token_a_symbol: sym_lo.clone(),
                                        known_price_usd_a: self.known_price_hint(sym_lo),
                                    },
                                );
                                match self
                                    .transport
                                    .http
                                    .with_retry(|provider| async move { fetch_tick_spacing(&provider, pool).await.map_err(|e| e.to_string()) })
                                    .await
                                {
                                    Ok(spacing) => {
                                        tick_spacings.insert(pool, spacing);
                                    }
                                    Err(e) => warn!("chain {}: tickSpacing() failed for pool {pool:?}: {e}", self.chain.name),
                                }
                            }
                        }
                    }
                }
            }
        }

        info!(
            "chain {} ({}): discovered {} pools across {} dexes",
            self.chain.name,
            self.chain.chain_id,
            targets.len(),
            self.chain.dexes.len()
        );
        *self.targets.write().await = targets;
        *self.contexts.write().await = contexts;
        *self.tick_spacings.write().await = tick_spacings;
        Ok(())
    }

    /// V3 fee-tier arbitrage (§4.2): groups this block's V3 states by
    /// `(dex_name, pair_key)` and compares price across fee tiers. Liquidity
    /// is approximated from raw on-tick liquidity the same coarse way the
    /// price fetcher already does for V3 quotes (no direct USD reserve).
    fn detect_v3_fee_tier(
        &self,
        states: &[PoolState],
        contexts: &HashMap<Address, QuoteContext>,
        ticks_by_pool: &HashMap<Address, Vec<Tick>>,
    ) -> Vec<Opportunity> {
        let mut groups: HashMap<(String, String), Vec<FeeTierQuote>> = HashMap::new();
        for state in states {
            let PoolState::V3 {
                fee_tier,
                sqrt_price_x96,
                liquidity,
                tick,
                token0_decimals,
                token1_decimals,
                address,
                key,
                ..
            } = state
            else {
                continue;
            };
            let Some(ctx) = contexts.get(address) else {
                continue;
            };
            let price = sqrt_price_x96_to_price(*sqrt_price_x96, *token0_decimals, *token1_decimals);
            if price <= 0.0 {
                continue;
            }
            let price_usd_a = ctx
                .known_price_usd_a
                .unwrap_or_else(|| crate::price_fetcher::fallback_price_usd(&ctx.token_a_symbol));
            let liquidity_usd = 2.0 * (*liquidity as f64 / 10f64.powi(*token0_decimals as i32)) * price_usd_a;
            let dex_fee = self
                .chain
                .dexes
                .get(&ctx.dex_name)
                .and_then(|d| d.v3_fee_tiers.iter().find(|&&t| t == *fee_tier).map(|_| *fee_tier as f64 / 1_000_000.0))
                .unwrap_or(*fee_tier as f64 / 1_000_000.0);
            groups.entry((ctx.dex_name.clone(), key.pair_key())).or_default().push(FeeTierQuote {
                fee_tier: *fee_tier,
                fee_fraction: dex_fee,
                price,
                liquidity: *liquidity,
                liquidity_usd,
                pool: *address,
                sqrt_price_x96: *sqrt_price_x96,
                tick: *tick,
                decimals0: *token0_decimals,
                decimals1: *token1_decimals,
            });
        }

        let mut out = Vec::new();
        for ((_, pair_key), quotes) in groups {
            let Some(payload) = detect_fee_tier_arbitrage(
                &pair_key,
                &quotes,
                self.chain.v3.min_profit_pct,
                self.chain.v3.min_liquidity_usd,
            ) else {
                continue;
            };
            let buy_q = quotes.iter().find(|q| q.fee_tier == payload.buy_tier);
            let sell_q = quotes.iter().find(|q| q.fee_tier == payload.sell_tier);
            let (mut profit_usd_net, mut trade_size_usd) = match (buy_q, sell_q) {
                (Some(buy), Some(sell)) => optimize_fee_tier_amount(&self.chain, buy, sell),
                _ => (0.0, 0.0),
            };
            if profit_usd_net <= 0.0 {
                continue;
            }
            let (Some(buy_q), Some(sell_q)) = (buy_q, sell_q) else {
                continue;
            };

            // Re-route each leg to its actual best-execution tier at this
            // trade size rather than assuming the widest-spread tier is also
            // the cheapest to trade against.
            let mut payload = payload;
            if let (Some(refined_buy), Some(refined_sell)) = (
                select_optimal_tier(&quotes, trade_size_usd, true),
                select_optimal_tier(&quotes, trade_size_usd, false),
            ) {
                if refined_buy.fee_tier != refined_sell.fee_tier
                    && (refined_buy.fee_tier != buy_q.fee_tier || refined_sell.fee_tier != sell_q.fee_tier)
                {
                    let (refined_profit, refined_size) = optimize_fee_tier_amount(&self.chain, refined_buy, refined_sell);
                    if refined_profit > profit_usd_net {
                        profit_usd_net = refined_profit;
                        trade_size_usd = refined_size;
                        payload = payload_from_quotes(&pair_key, refined_buy, refined_sell);
                    }
                }
            }

            // Depth-gate: don't act on a tier whose tick window is too
            // sparse to trust the quoted liquidity at the offsets that
            // matter for this trade.
            if let Some(ticks) = ticks_by_pool.get(&buy_q.pool) {
                let depth = build_depth_profile(buy_q.tick, ticks);
                if depth.depth_score < MIN_DEPTH_SCORE {
                    debug!(
                        pair = %pair_key,
                        depth_score = depth.depth_score,
                        "v3 fee-tier: tick window too thin to trust, skipping"
                    );
                    continue;
                }
            }

            // Cross-check the coarse log-grid profit against an exact
            // cross-tick simulation of the buy leg when its tick window is
            // cached — the log-grid treats liquidity as a flat constant-
            // product reserve, which under-counts impact right where real
            // concentrated liquidity thins out.
            if let Some(ticks) = ticks_by_pool.get(&buy_q.pool) {
                if let Some(impact_pct) = simulate_buy_leg_impact(buy_q, trade_size_usd, ticks) {
                    if impact_pct > 0.0 {
                        profit_usd_net *= (1.0 - impact_pct / 100.0).max(0.0);
                    }
                }
            }
            if profit_usd_net <= 0.0 {
                continue;
            }

            out.push(Opportunity::v3_fee_tier(
                self.chain.chain_id,
                payload,
                profit_usd_net,
                trade_size_usd,
                0,
                now_ms(),
            ));
        }
        out
    }

    async fn process_block(
        &self,
        block_number: u64,
        opp_tx: &mpsc::Sender<Opportunity>,
        snapshot_tx: &watch::Sender<ChainPriceSnapshot>,
    ) {
        let start = Instant::now();
        let now = now_ms();
        let target_list = self.targets.read().await.clone();
        if target_list.is_empty() {
            return;
        }

        let states = match self
            .transport
            .http
            .with_retry(|provider| {
                let target_list = target_list.clone();
                async move { fetch_batch(&provider, &target_list, block_number, now).await.map_err(|e| e.to_string()) }
            })
            .await
        {
            Ok(states) => states,
            Err(e) => {
                self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!("chain {}: price fetch failed at block {block_number}: {e}", self.chain.name);
                return;
            }
        };

        let contexts = self.contexts.read().await;
        let tick_spacings = self.tick_spacings.read().await.clone();
        let mut ticks_by_pool: HashMap<Address, Vec<Tick>> = HashMap::new();
        for state in &states {
            if let PoolState::V3 { address, tick, liquidity, token0_decimals, token1_decimals, .. } = state {
                if let Some(crossing) = self.analyzer.observe_tick(*address, *tick, *liquidity, *token0_decimals, *token1_decimals) {
                    debug!(
                        pool = ?address,
                        ticks_crossed = crossing.ticks_crossed,
                        price_change_pct = crossing.price_change_pct,
                        "tick crossing observed"
                    );
                }
                // 60 (the common 0.3%-tier spacing) only stands in for pools
                // discovery hasn't resolved a real tickSpacing() for yet.
                let tick_spacing = tick_spacings.get(address).copied().unwrap_or(60);
                if let Some(jit) = self.analyzer.jit_status(*address, *tick, tick_spacing, self.chain.v3.tick_window) {
                    debug!(pool = ?address, tick = jit.tick, "possible JIT liquidity window");
                }

                let ticks = match self.analyzer.cache.get(*address, *tick) {
                    Some(cached) => cached,
                    None => {
                        let pool = *address;
                        let current_tick = *tick;
                        let window = self.chain.v3.tick_window;
                        match self
                            .transport
                            .http
                            .with_retry(|provider| async move {
                                fetch_tick_window(&provider, pool, current_tick, tick_spacing, window)
                                    .await
                                    .map_err(|e| e.to_string())
                            })
                            .await
                        {
                            Ok(fetched) => {
                                self.analyzer.cache.insert(pool, current_tick, fetched.clone());
                                fetched
                            }
                            Err(e) => {
                                debug!(pool = ?address, "tick window fetch failed: {e}");
                                Vec::new()
                            }
                        }
                    }
                };
                if !ticks.is_empty() {
                    ticks_by_pool.insert(*address, ticks);
                }
            }
        }

        let mut fee_tier_opps = self.detect_v3_fee_tier(&states, &contexts, &ticks_by_pool);

        let priced: Vec<(PoolState, QuoteContext)> = states
            .into_iter()
            .filter_map(|state| contexts.get(&state.address()).map(|ctx| (state, clone_ctx(ctx))))
            .collect();
        drop(contexts);

        let snapshot = {
            let mut fetcher = self.fetcher.lock().await;
            fetcher.build_snapshot(&priced, block_number, now)
        };

        let mut opportunities = detect_cross_dex(&self.chain, &snapshot);
        opportunities.extend(detect_triangular(&self.chain, &snapshot));
        opportunities.append(&mut fee_tier_opps);

        let mut cooldown = self.cooldown.lock().await;
        for opp in opportunities {
            if let Some(payload) = &opp.cross_dex {
                if !cooldown.is_cooled_down(&payload.pair_key, &payload.buy_dex, &payload.sell_dex, block_number) {
                    self.stats.opportunities_found.fetch_add(1, Ordering::Relaxed);
                    if opp_tx.send(opp).await.is_err() {
                        warn!("chain {}: opportunity channel closed, dropping worker output", self.chain.name);
                        return;
                    }
                }
            } else {
                self.stats.opportunities_found.fetch_add(1, Ordering::Relaxed);
                if opp_tx.send(opp).await.is_err() {
                    warn!("chain {}: opportunity channel closed, dropping worker output", self.chain.name);
                    return;
                }
            }
        }
        drop(cooldown);

        self.stats.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.stats
            .last_fetch_duration_ms
            .store(start.elapsed().as_millis() as u64, Ordering::Relaxed);
        let _ = snapshot_tx.send(snapshot);
    }

    /// Fallback for a chain with no WS endpoints configured: polls
    /// `eth_blockNumber` on the chain's own cadence instead of subscribing.
    async fn poll_loop(&self, opp_tx: mpsc::Sender<Opportunity>, snapshot_tx: watch::Sender<ChainPriceSnapshot>) {
        let mut last_block = 0u64;
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(self.chain.block_time_ms.max(250)));
        let mut self_heal = tokio::time::interval(Duration::from_secs(SELF_HEAL_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = self_heal.tick() => {
                    self.transport.http.self_heal_once().await;
                }
                _ = interval.tick() => {
                    let block_number = match self
                        .transport
                        .http
                        .with_retry(|provider| async move {
                            use alloy::providers::Provider;
                            provider.get_block_number().await.map_err(|e| e.to_string())
                        })
                        .await
                    {
                        Ok(b) => b,
                        Err(e) => {
                            warn!("chain {}: poll block number failed: {e}", self.chain.name);
                            continue;
                        }
                    };
                    if block_number <= last_block {
                        continue;
                    }
                    last_block = block_number;
                    self.process_block(block_number, &opp_tx, &snapshot_tx).await;
                }
                _ = self.shutdown.notified() => return,
            }
        }
    }

    /// Runs until `shutdown()` is called: subscribes to new blocks (via WS
    /// if configured, else polling) and processes each one in turn (§4.7).
    pub async fn run(self: Arc<Self>, opp_tx: mpsc::Sender<Opportunity>, snapshot_tx: watch::Sender<ChainPriceSnapshot>) {
        let Some(ws) = self.transport.ws.clone() else {
            info!("chain {}: no WS endpoints configured, polling for new blocks", self.chain.name);
            self.poll_loop(opp_tx, snapshot_tx).await;
            return;
        };
        let mut blocks = ws.spawn();
        let mut self_heal = tokio::time::interval(Duration::from_secs(SELF_HEAL_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = self_heal.tick() => {
                    self.transport.http.self_heal_once().await;
                }
                received = blocks.recv() => {
                    match received {
                        Ok(block_number) => self.process_block(block_number, &opp_tx, &snapshot_tx).await,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("chain {}: block stream lagged by {n}", self.chain.name);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("chain {}: block stream closed", self.chain.name);
                            return;
                        }
                    }
                }
                _ = self.shutdown.notified() => return,
            }
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.transport.shutdown();
    }
}

/// Best `(profit_usd_net, trade_size_usd)` for a fee-tier spread, same
/// log-grid search and USD-synthetic-reserve approximation the cross-DEX
/// detector uses, reusing each tier's coarse `liquidity_usd` estimate.
fn optimize_fee_tier_amount(chain: &ChainSpec, buy: &FeeTierQuote, sell: &FeeTierQuote) -> (f64, f64) {
    use crate::detect::profit::{expected_slippage_usd, flash_loan_fee, gas_cost_usd, log_grid, v2_amount_out};

    let buy_reserve = buy.liquidity_usd / 2.0;
    let sell_reserve = sell.liquidity_usd / 2.0;
    if buy_reserve <= 0.0 || sell_reserve <= 0.0 {
        return (0.0, 0.0);
    }

    let flash_fee_fraction = chain.flash_loan.fee_fraction();
    let gas_usd = gas_cost_usd(chain.trading.gas_price_gwei, chain.trading.estimated_gas_limit, chain.native_token.price_usd_fallback);

    let mut best_amount = 0.0;
    let mut best_profit = 0.0;
    for amount_in in log_grid(chain.trading.min_trade_usd, chain.trading.max_trade_size_usd, 24) {
        let leg1 = v2_amount_out(amount_in, buy_reserve, buy_reserve, buy.fee_fraction);
        if leg1 <= 0.0 {
            continue;
        }
        let leg2 = v2_amount_out(leg1, sell_reserve, sell_reserve, sell.fee_fraction);
        if leg2 <= 0.0 {
            continue;
        }
        let gross = leg2 - amount_in;
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

/// Rebuilds a `V3FeeTierPayload` for a specific pair of tiers, same
/// effective-price formula `detect_fee_tier_arbitrage` uses, so a
/// `select_optimal_tier`-driven re-route reports the tiers it actually
/// optimized for rather than the ones the initial spread scan picked.
fn payload_from_quotes(pair_key: &str, buy: &FeeTierQuote, sell: &FeeTierQuote) -> V3FeeTierPayload {
    let effective_buy = buy.price * (1.0 + buy.fee_fraction);
    let effective_sell = sell.price * (1.0 - sell.fee_fraction);
    let spread_pct = if effective_buy > 0.0 { (effective_sell - effective_buy) / effective_buy * 100.0 } else { 0.0 };
    V3FeeTierPayload {
        pair_key: pair_key.to_string(),
        buy_tier: buy.fee_tier,
        sell_tier: sell.fee_tier,
        buy_price: buy.price,
        sell_price: sell.price,
        spread_pct,
    }
}

/// Runs the exact cross-tick simulator over the buy leg at the chosen
/// trade size and returns its `price_impact_pct`, to tighten
/// `optimize_fee_tier_amount`'s flat-reserve approximation. `None` when
/// there isn't enough to convert the USD trade size into a raw amount.
fn simulate_buy_leg_impact(buy: &FeeTierQuote, trade_size_usd: f64, ticks: &[Tick]) -> Option<f64> {
    if trade_size_usd <= 0.0 || buy.price <= 0.0 || ticks.is_empty() {
        return None;
    }
    let amount_in_token0 = trade_size_usd / buy.price;
    if !amount_in_token0.is_finite() || amount_in_token0 <= 0.0 {
        return None;
    }
    let amount_in_raw = U256::from((amount_in_token0 * 10f64.powi(buy.decimals0 as i32)).max(0.0) as u128);
    if amount_in_raw.is_zero() {
        return None;
    }
    let result = calculate_swap_output_with_ticks(
        amount_in_raw,
        buy.sqrt_price_x96,
        buy.liquidity,
        buy.tick,
        ticks,
        buy.fee_tier,
        true,
        buy.decimals0,
        buy.decimals1,
    );
    Some(result.price_impact_pct)
}

fn clone_ctx(ctx: &QuoteContext) -> QuoteContext {
    QuoteContext {
        dex_name: ctx.dex_name.clone(),
        token_a_symbol: ctx.token_a_symbol.clone(),
        known_price_usd_a: ctx.known_price_usd_a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BridgeSpec, DexKind, DexSpec, FlashLoanConfig, MonitoringParams, NativeToken, RpcConfig, TokenSpec,
        TradingParams, TriangularParams, V3Params,
    };
    use std::collections::HashMap as Map;

    fn sample_chain() -> ChainSpec {
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
                http: vec!["http://localhost:8545".into()],
                ws: vec![],
                max_requests_per_minute: 300,
                request_delay_ms: 0,
                retry_attempts: 1,
                retry_delay_ms: 1,
            },
            dexes: Map::from([(
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
            )]),
            tokens: Map::from([(
                "WETH".to_string(),
                TokenSpec { address: Address::ZERO, decimals: 18 },
            )]),
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

    #[test]
    fn new_rejects_invalid_chain_config() {
        let mut chain = sample_chain();
        chain.rpc.http.clear();
        assert!(ChainWorker::new(chain).is_err());
    }

    #[test]
    fn new_builds_worker_for_valid_chain() {
        let worker = ChainWorker::new(sample_chain()).unwrap();
        assert_eq!(worker.chain_id(), 1);
        let (blocks, opps, failures, _) = worker.stats().snapshot();
        assert_eq!((blocks, opps, failures), (0, 0, 0));
    }

    #[test]
    fn known_price_hint_matches_native_symbol_only() {
        let worker = ChainWorker::new(sample_chain()).unwrap();
        assert_eq!(worker.known_price_hint("ETH"), Some(3300.0));
        assert_eq!(worker.known_price_hint("USDC"), None);
    }
}
