//! Core data model
//!
//! One submodule per family of entities from the data model: chain-level
//! configuration, pool/price state, and the opportunity/event types emitted
//! downstream.

mod chain;
mod health;
mod opportunity;
mod pool;
mod price;

pub use chain::{
    BridgeSpec, ChainSpec, CrossChainBridgeCost, CrossChainConfig, CrossChainTokenEntry, DexKind,
    DexSpec, FlashLoanConfig, FlashLoanProvider, MonitoringParams, NativeToken, RootConfig,
    RpcConfig, TokenSpec, TradingParams, TriangularParams, V3Params,
};
pub use health::{EndpointHealth, EndpointKind};
pub use opportunity::{
    CrossChainPayload, CrossDexPayload, JitLiquidity, Opportunity, OpportunityKind,
    TickCrossing, TriangularPayload, V3FeeTierPayload,
};
pub use pool::{BundleTiming, LiquidityEvent, PoolKey, PoolState, Tick, TickCacheEntry};
pub use price::{ChainPriceSnapshot, PriceQuote};
