//! Opportunity detectors (§4.4–§4.6): cross-DEX, triangular, and
//! cross-chain spread search, plus the profit-calculation primitives
//! shared across all three.

pub mod cross_chain;
pub mod cross_dex;
pub mod profit;
pub mod triangular;

pub use cross_chain::detect_cross_chain;
pub use cross_dex::detect_cross_dex;
pub use triangular::detect_triangular;
