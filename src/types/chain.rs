//! Chain-level configuration: `ChainSpec`, `DexSpec`, and the global
//! cross-chain configuration. These double as the serde schema for the
//! TOML configuration surface described in spec §6.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level configuration document: one entry per enabled chain plus the
/// global cross-chain settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootConfig {
    pub chains: Vec<ChainSpec>,
    #[serde(default)]
    pub cross_chain: CrossChainConfig,
}

/// Immutable per-chain configuration, built once at startup.
///
/// Invariants (enforced by `ChainSpec::validate`):
/// - `base_tokens` is a subset of `tokens.keys()`
/// - every token address is a valid 20-byte hex address (enforced by the
///   `Address` type itself at deserialization time)
/// - at least one HTTP endpoint is configured
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainSpec {
    pub chain_id: u64,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub block_time_ms: u64,
    pub native_token: NativeToken,

    pub rpc: RpcConfig,

    pub dexes: HashMap<String, DexSpec>,
    pub tokens: HashMap<String, TokenSpec>,
    pub base_tokens: Vec<String>,

    pub trading: TradingParams,
    #[serde(default)]
    pub monitoring: MonitoringParams,
    #[serde(default)]
    pub triangular: TriangularParams,
    #[serde(default)]
    pub v3: V3Params,
    #[serde(default)]
    pub flash_loan: FlashLoanConfig,
    #[serde(default)]
    pub bridges: HashMap<String, BridgeSpec>,
}

fn default_true() -> bool {
    true
}

impl ChainSpec {
    /// Validate the invariants listed in the data model table (§3).
    /// Returns a human-readable message on violation so the caller can
    /// surface a `ConfigError` and refuse to start this chain's worker.
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc.http.is_empty() {
            return Err(format!(
                "chain {} ({}): at least one HTTP endpoint is required",
                self.chain_id, self.name
            ));
        }
        for base in &self.base_tokens {
            if !self.tokens.contains_key(base) {
                return Err(format!(
                    "chain {} ({}): base token '{base}' is not present in tokens registry",
                    self.chain_id, self.name
                ));
            }
        }
        for (name, dex) in &self.dexes {
            if let Err(e) = dex.validate() {
                return Err(format!(
                    "chain {} ({}): dex '{name}': {e}",
                    self.chain_id, self.name
                ));
            }
        }
        Ok(())
    }

    pub fn token_address(&self, symbol: &str) -> Option<Address> {
        self.tokens.get(symbol).map(|t| t.address)
    }

    pub fn is_base_token(&self, symbol: &str) -> bool {
        self.base_tokens.iter().any(|b| b == symbol)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeToken {
    pub symbol: String,
    pub decimals: u8,
    pub wrapped: Address,
    pub price_usd_fallback: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcConfig {
    pub http: Vec<String>,
    #[serde(default)]
    pub ws: Vec<String>,
    #[serde(default = "default_max_rpm")]
    pub max_requests_per_minute: u32,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_rpm() -> u32 {
    300
}
fn default_request_delay_ms() -> u64 {
    50
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    250
}

/// DEX kind — closed enum per §3/§9 (replaces the source's dynamic
/// factory/string lookup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DexKind {
    V2,
    V3,
    Solidly,
    Curve,
    Balancer,
    Maverick,
    Wombat,
    Woofi,
    Dodo,
    Gmx,
}

impl DexKind {
    pub fn is_v2(self) -> bool {
        matches!(self, DexKind::V2 | DexKind::Solidly)
    }

    pub fn is_v3(self) -> bool {
        matches!(self, DexKind::V3)
    }
}

/// Immutable part of `ChainSpec`: one configured DEX.
///
/// Invariants: V2 swap fee must be in `(0, 0.1)`; V3 tiers must be
/// non-empty when `kind == V3`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DexSpec {
    pub name: String,
    pub kind: DexKind,
    pub router: Address,
    pub factory: Address,
    #[serde(default)]
    pub v2_fee: Option<f64>,
    #[serde(default)]
    pub v3_fee_tiers: Vec<u32>,
    #[serde(default)]
    pub tvl_rank: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl DexSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.kind.is_v2() {
            if let Some(fee) = self.v2_fee {
                if !(fee > 0.0 && fee < 0.1) {
                    return Err(format!("V2 fee {fee} out of range (0, 0.1)"));
                }
            }
        }
        if self.kind == DexKind::V3 && self.v3_fee_tiers.is_empty() {
            return Err("V3 dex must declare at least one fee tier".to_string());
        }
        Ok(())
    }

    /// Swap fee as a fraction, falling back to the spec's 0.3% default for
    /// an unknown/unconfigured V2 DEX (§4.4 robustness rule).
    pub fn fee_fraction(&self) -> f64 {
        self.v2_fee.unwrap_or(0.003)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenSpec {
    pub address: Address,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingParams {
    pub min_profit_pct: f64,
    #[serde(default = "default_slippage_pct")]
    pub max_slippage_pct: f64,
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: f64,
    #[serde(default = "default_gas_limit")]
    pub estimated_gas_limit: u64,
    #[serde(default = "default_min_trade_usd")]
    pub min_trade_usd: f64,
    #[serde(default = "default_max_trade_usd")]
    pub max_trade_size_usd: f64,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
}

fn default_slippage_pct() -> f64 {
    0.5
}
fn default_gas_price_gwei() -> f64 {
    30.0
}
fn default_gas_limit() -> u64 {
    300_000
}
fn default_min_trade_usd() -> f64 {
    100.0
}
fn default_max_trade_usd() -> f64 {
    50_000.0
}
fn default_min_liquidity_usd() -> f64 {
    5_000.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringParams {
    #[serde(default = "default_max_pairs")]
    pub max_pairs: u32,
    #[serde(default = "default_cache_size")]
    pub cache_size: u32,
    #[serde(default = "default_block_timeout_ms")]
    pub block_processing_timeout_ms: u64,
}

fn default_max_pairs() -> u32 {
    200
}
fn default_cache_size() -> u32 {
    1000
}
fn default_block_timeout_ms() -> u64 {
    2000
}

impl Default for MonitoringParams {
    fn default() -> Self {
        Self {
            max_pairs: default_max_pairs(),
            cache_size: default_cache_size(),
            block_processing_timeout_ms: default_block_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriangularParams {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_max_trade_usd")]
    pub max_trade_size_usd: f64,
}

fn default_max_path_length() -> usize {
    4
}

impl Default for TriangularParams {
    fn default() -> Self {
        Self {
            enabled: true,
            max_path_length: default_max_path_length(),
            min_liquidity_usd: default_min_liquidity_usd(),
            max_trade_size_usd: default_max_trade_usd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct V3Params {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_fee_tiers")]
    pub fee_tiers: Vec<u32>,
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_v3_min_profit_pct")]
    pub min_profit_pct: f64,
    #[serde(default = "default_tick_window")]
    pub tick_window: i32,
    #[serde(default = "default_cache_max_age_secs")]
    pub cache_max_age_secs: u64,
    #[serde(default = "default_jit_window_secs")]
    pub jit_window_secs: u64,
    #[serde(default = "default_jit_threshold")]
    pub jit_threshold: f64,
    #[serde(default = "default_tick_crossing_threshold")]
    pub tick_crossing_threshold: i32,
}

fn default_fee_tiers() -> Vec<u32> {
    vec![500, 3000, 10000]
}
fn default_v3_min_profit_pct() -> f64 {
    0.1
}
fn default_tick_window() -> i32 {
    10
}
fn default_cache_max_age_secs() -> u64 {
    30
}
fn default_jit_window_secs() -> u64 {
    60
}
fn default_jit_threshold() -> f64 {
    0.8
}
fn default_tick_crossing_threshold() -> i32 {
    10
}

impl Default for V3Params {
    fn default() -> Self {
        Self {
            enabled: true,
            fee_tiers: default_fee_tiers(),
            min_liquidity_usd: default_min_liquidity_usd(),
            min_profit_pct: default_v3_min_profit_pct(),
            tick_window: default_tick_window(),
            cache_max_age_secs: default_cache_max_age_secs(),
            jit_window_secs: default_jit_window_secs(),
            jit_threshold: default_jit_threshold(),
            tick_crossing_threshold: default_tick_crossing_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlashLoanProvider {
    pub name: String,
    pub fee_fraction: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FlashLoanConfig {
    #[serde(default)]
    pub providers: Vec<FlashLoanProvider>,
    #[serde(default)]
    pub preferred_provider: Option<String>,
}

impl FlashLoanConfig {
    /// Fee fraction for the preferred provider, or 0 if none configured
    /// (self-funded capital — no flash loan used).
    pub fn fee_fraction(&self) -> f64 {
        let preferred = self.preferred_provider.as_deref();
        self.providers
            .iter()
            .find(|p| preferred.map(|name| name == p.name).unwrap_or(false))
            .or_else(|| self.providers.first())
            .map(|p| p.fee_fraction)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeSpec {
    pub router: Address,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrossChainBridgeCost {
    pub cost_usd: f64,
    pub minutes: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrossChainTokenEntry {
    /// chain_id -> token address on that chain
    pub chains: HashMap<u64, Address>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrossChainConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cross_chain_min_profit_usd")]
    pub min_profit_usd: f64,
    #[serde(default = "default_max_price_age_ms")]
    pub max_price_age_ms: u64,
    #[serde(default = "default_min_spread_pct")]
    pub min_spread_pct: f64,
    #[serde(default)]
    pub cross_chain_tokens: HashMap<String, CrossChainTokenEntry>,
    /// bridge_costs[from][to] -> cost
    #[serde(default)]
    pub bridge_costs: HashMap<String, HashMap<String, CrossChainBridgeCost>>,
}

fn default_cross_chain_min_profit_usd() -> f64 {
    20.0
}
fn default_max_price_age_ms() -> u64 {
    5_000
}
fn default_min_spread_pct() -> f64 {
    0.1
}

impl Default for CrossChainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_profit_usd: default_cross_chain_min_profit_usd(),
            max_price_age_ms: default_max_price_age_ms(),
            min_spread_pct: default_min_spread_pct(),
            cross_chain_tokens: HashMap::new(),
            bridge_costs: HashMap::new(),
        }
    }
}

impl CrossChainConfig {
    /// Default fallback used when neither direction is configured:
    /// 25 USD, 30 minutes (§4.6).
    pub fn bridge_cost(&self, from_chain: &str, to_chain: &str) -> CrossChainBridgeCost {
        if let Some(cost) = self
            .bridge_costs
            .get(from_chain)
            .and_then(|m| m.get(to_chain))
        {
            return cost.clone();
        }
        if let Some(cost) = self
            .bridge_costs
            .get(to_chain)
            .and_then(|m| m.get(from_chain))
        {
            return cost.clone();
        }
        CrossChainBridgeCost {
            cost_usd: 25.0,
            minutes: 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chain() -> ChainSpec {
        ChainSpec {
            chain_id: 137,
            name: "polygon".into(),
            enabled: true,
            block_time_ms: 2000,
            native_token: NativeToken {
                symbol: "MATIC".into(),
                decimals: 18,
                wrapped: Address::ZERO,
                price_usd_fallback: 0.5,
            },
            rpc: RpcConfig {
                http: vec!["https://rpc.example/1".into()],
                ws: vec![],
                max_requests_per_minute: default_max_rpm(),
                request_delay_ms: default_request_delay_ms(),
                retry_attempts: default_retry_attempts(),
                retry_delay_ms: default_retry_delay_ms(),
            },
            dexes: HashMap::new(),
            tokens: HashMap::from([(
                "WETH".to_string(),
                TokenSpec {
                    address: Address::ZERO,
                    decimals: 18,
                },
            )]),
            base_tokens: vec!["WETH".to_string()],
            trading: TradingParams {
                min_profit_pct: 0.2,
                max_slippage_pct: default_slippage_pct(),
                gas_price_gwei: default_gas_price_gwei(),
                estimated_gas_limit: default_gas_limit(),
                min_trade_usd: default_min_trade_usd(),
                max_trade_size_usd: default_max_trade_usd(),
                min_liquidity_usd: default_min_liquidity_usd(),
            },
            monitoring: MonitoringParams::default(),
            triangular: TriangularParams::default(),
            v3: V3Params::default(),
            flash_loan: FlashLoanConfig::default(),
            bridges: HashMap::new(),
        }
    }

    #[test]
    fn validate_rejects_missing_http_endpoint() {
        let mut chain = sample_chain();
        chain.rpc.http.clear();
        assert!(chain.validate().is_err());
    }

    #[test]
    fn validate_rejects_base_token_not_in_registry() {
        let mut chain = sample_chain();
        chain.base_tokens.push("GHOST".to_string());
        assert!(chain.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_chain() {
        assert!(sample_chain().validate().is_ok());
    }

    #[test]
    fn unknown_dex_falls_back_to_default_fee() {
        let dex = DexSpec {
            name: "mystery".into(),
            kind: DexKind::V2,
            router: Address::ZERO,
            factory: Address::ZERO,
            v2_fee: None,
            v3_fee_tiers: vec![],
            tvl_rank: 0,
            enabled: true,
        };
        assert!((dex.fee_fraction() - 0.003).abs() < 1e-12);
    }

    #[test]
    fn bridge_cost_falls_back_to_default() {
        let cfg = CrossChainConfig::default();
        let cost = cfg.bridge_cost("polygon", "arbitrum");
        assert_eq!(cost.cost_usd, 25.0);
        assert_eq!(cost.minutes, 30.0);
    }

    #[test]
    fn bridge_cost_uses_reverse_route_when_forward_missing() {
        let mut cfg = CrossChainConfig::default();
        let mut to_map = HashMap::new();
        to_map.insert(
            "polygon".to_string(),
            CrossChainBridgeCost {
                cost_usd: 3.0,
                minutes: 12.0,
            },
        );
        cfg.bridge_costs.insert("arbitrum".to_string(), to_map);
        let cost = cfg.bridge_cost("polygon", "arbitrum");
        assert_eq!(cost.cost_usd, 3.0);
    }
}
