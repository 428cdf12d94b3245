//! Multi-chain DEX arbitrage discovery engine.
//!
//! Watches configured DEX pools across one or more EVM chains, detects
//! cross-DEX, triangular, V3 fee-tier, and cross-chain spreads, and emits
//! `Opportunity` events. Discovery only — no execution or signing.

pub mod analyzer;
pub mod config;
pub mod contracts;
pub mod cooldown;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod price_fetcher;
pub mod transport;
pub mod types;
pub mod worker;

pub use config::load_config;
pub use coordinator::{Coordinator, CoordinatorStats};
pub use error::{CoreError, CoreResult};
pub use types::{Opportunity, OpportunityKind, RootConfig};
