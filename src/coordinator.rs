//! Coordinator (§4.8): owns one `ChainWorker` per enabled chain, tracks each
//! chain's latest price snapshot, and runs the cross-chain detector whenever
//! any chain publishes a fresh one. Per-chain and cross-chain opportunities
//! are multiplexed onto a single outbound channel the caller drains.

use crate::detect::detect_cross_chain;
use crate::error::{CoreError, CoreResult};
use crate::types::{ChainPriceSnapshot, ChainSpec, CrossChainConfig, Opportunity, RootConfig};
use crate::worker::ChainWorker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Aggregate stats across every chain worker, summed on demand.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoordinatorStats {
    pub blocks_processed: u64,
    pub opportunities_found: u64,
    pub fetch_failures: u64,
}

struct ChainHandle {
    worker: Arc<ChainWorker>,
    task: JoinHandle<()>,
}

/// Multi-chain supervisor: spawns a `ChainWorker` per chain, watches their
/// price snapshots, and runs the cross-chain detector on every update.
pub struct Coordinator {
    chains: HashMap<u64, ChainSpec>,
    cross_chain: CrossChainConfig,
    handles: Mutex<Vec<ChainHandle>>,
    snapshots: Arc<Mutex<HashMap<u64, ChainPriceSnapshot>>>,
    opp_tx: mpsc::Sender<Opportunity>,
    opp_rx: Mutex<Option<mpsc::Receiver<Opportunity>>>,
}

impl Coordinator {
    /// Builds a coordinator for every enabled chain in `config`. Does not
    /// spawn any workers yet; call [`Coordinator::run`] for that.
    pub fn new(config: RootConfig) -> CoreResult<Self> {
        let mut chains = HashMap::new();
        for chain in config.chains.into_iter().filter(|c| c.enabled) {
            chain
                .validate()
                .map_err(|message| CoreError::ConfigError { message })?;
            chains.insert(chain.chain_id, chain);
        }
        if chains.is_empty() {
            return Err(CoreError::ConfigError {
                message: "no enabled chains in configuration".into(),
            });
        }

        let (opp_tx, opp_rx) = mpsc::channel(1024);

        Ok(Self {
            chains,
            cross_chain: config.cross_chain,
            handles: Mutex::new(Vec::new()),
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            opp_tx,
            opp_rx: Mutex::new(Some(opp_rx)),
        })
    }

    /// Takes the outbound opportunity stream. Call once; the caller owns
    /// draining it for the lifetime of the coordinator.
    pub async fn take_opportunities(&self) -> Option<mpsc::Receiver<Opportunity>> {
        self.opp_rx.lock().await.take()
    }

    /// Discovers pools and starts a task per chain, plus a snapshot-watcher
    /// task per chain that re-runs the cross-chain detector on every update.
    pub async fn start(&self) -> CoreResult<()> {
        let mut handles = self.handles.lock().await;
        for chain in self.chains.values() {
            let worker = Arc::new(ChainWorker::new(chain.clone())?);
            worker.discover_pools().await?;

            let (snap_tx, snap_rx) = watch::channel(ChainPriceSnapshot::empty(chain.chain_id));

            let run_worker = worker.clone();
            let run_opp_tx = self.opp_tx.clone();
            let task = tokio::spawn(async move {
                run_worker.run(run_opp_tx, snap_tx).await;
            });

            self.spawn_snapshot_watcher(chain.chain_id, snap_rx);

            handles.push(ChainHandle { worker, task });
        }
        info!(chains = handles.len(), "coordinator started all chain workers");
        Ok(())
    }

    /// Watches one chain's snapshot channel and re-runs cross-chain
    /// detection against the latest snapshot of every other chain whenever
    /// this chain publishes a new one.
    fn spawn_snapshot_watcher(&self, chain_id: u64, mut snap_rx: watch::Receiver<ChainPriceSnapshot>) {
        let chains = self.chains.clone();
        let cross_chain = self.cross_chain.clone();
        let snapshots = self.snapshots.clone();
        let opp_tx = self.opp_tx.clone();

        tokio::spawn(async move {
            loop {
                if snap_rx.changed().await.is_err() {
                    break;
                }
                let snapshot = snap_rx.borrow_and_update().clone();
                let mut guard = snapshots.lock().await;
                guard.insert(chain_id, snapshot);
                let snapshots_copy = guard.clone();
                drop(guard);

                let opportunities = detect_cross_chain(&cross_chain, &chains, &snapshots_copy, now_ms());
                for opp in opportunities {
                    if opp_tx.send(opp).await.is_err() {
                        return;
                    }
                }
            }
        });
    }

    /// Aggregate stats summed across every running chain worker.
    pub async fn stats(&self) -> CoordinatorStats {
        let handles = self.handles.lock().await;
        let mut out = CoordinatorStats::default();
        for handle in handles.iter() {
            let (blocks, opps, failures, _) = handle.worker.stats().snapshot();
            out.blocks_processed += blocks;
            out.opportunities_found += opps;
            out.fetch_failures += failures;
        }
        out
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        self.chains.keys().copied().collect()
    }

    /// Signals every worker to stop and waits up to `timeout` for their
    /// tasks to finish, logging (not failing) on stragglers.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut handles = self.handles.lock().await;
        for handle in handles.iter() {
            handle.worker.shutdown();
        }
        for handle in handles.drain(..) {
            if tokio::time::timeout(timeout, handle.task).await.is_err() {
                warn!(chain_id = handle.worker.chain_id(), "chain worker did not shut down within timeout");
            }
        }
        info!("coordinator shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BridgeSpec, DexSpec, FlashLoanConfig, MonitoringParams, NativeToken, RpcConfig, TokenSpec,
        TradingParams, TriangularParams, V3Params,
    };
    use alloy::primitives::Address;
    use std::collections::HashMap as Map;

    fn sample_chain(id: u64) -> ChainSpec {
        ChainSpec {
            chain_id: id,
            name: format!("chain-{id}"),
            enabled: true,
            block_time_ms: 2_000,
            native_token: NativeToken {
                symbol: "ETH".into(),
                decimals: 18,
                wrapped: Address::from([1u8; 20]),
                price_usd_fallback: 3300.0,
            },
            rpc: RpcConfig {
                http: vec!["http://localhost:8545".into()],
                ws: vec![],
                max_requests_per_minute: 300,
                request_delay_ms: 50,
                retry_attempts: 3,
                retry_delay_ms: 250,
            },
            dexes: Map::<String, DexSpec>::new(),
            tokens: Map::<String, TokenSpec>::new(),
            base_tokens: vec![],
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
    fn new_rejects_empty_chain_list() {
        let config = RootConfig { chains: vec![], cross_chain: CrossChainConfig::default() };
        assert!(Coordinator::new(config).is_err());
    }

    #[test]
    fn new_rejects_all_chains_disabled() {
        let mut chain = sample_chain(1);
        chain.enabled = false;
        let config = RootConfig { chains: vec![chain], cross_chain: CrossChainConfig::default() };
        assert!(Coordinator::new(config).is_err());
    }

    #[tokio::test]
    async fn new_builds_coordinator_for_enabled_chains() {
        let config = RootConfig {
            chains: vec![sample_chain(1), sample_chain(2)],
            cross_chain: CrossChainConfig::default(),
        };
        let coordinator = Coordinator::new(config).unwrap();
        let mut ids = coordinator.chain_ids();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        let stats = coordinator.stats().await;
        assert_eq!(stats.blocks_processed, 0);
    }
}
