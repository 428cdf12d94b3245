//! Error taxonomy
//!
//! Closed set of error kinds the core can produce, matching the
//! propagation policy: network-local errors recover via retry/failover,
//! math/protocol-local errors are swallowed and recorded in stats,
//! configuration errors are fatal only for the affected chain.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transport transient error on {endpoint}: {message}")]
    TransportTransient { endpoint: String, message: String },

    #[error("transport rate limited on {endpoint}: {message}")]
    TransportRateLimited { endpoint: String, message: String },

    #[error("transport exhausted after {attempts} attempts: {message}")]
    TransportExhausted { attempts: u32, message: String },

    #[error("websocket handshake failed for {endpoint} after {attempts} attempts")]
    WsHandshakeFailed { endpoint: String, attempts: u32 },

    #[error("websocket frame error on {endpoint}: {message}")]
    WsFrameError { endpoint: String, message: String },

    #[error("multicall decode error: {message}")]
    DecodeError { message: String },

    #[error("math domain error: {message}")]
    MathDomain { message: String },

    #[error("configuration error: {message}")]
    ConfigError { message: String },

    #[error("shutdown requested")]
    ShutdownRequested,
}

impl CoreError {
    pub fn is_fatal_for_chain(&self) -> bool {
        matches!(self, CoreError::ConfigError { .. })
    }

    pub fn rate_limit_matches(message: &str) -> bool {
        let lower = message.to_ascii_lowercase();
        lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("quota exceeded")
            || lower.contains("capacity")
            || lower.contains("429")
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
