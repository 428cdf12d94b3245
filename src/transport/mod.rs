//! Transport pool (T): resilient HTTP + WebSocket access to a single
//! chain's RPC endpoints (§4.1). Owned exclusively by one chain worker.

mod http_pool;
mod rate_limit;
mod ws_pool;

pub use http_pool::{HttpPool, HttpPoolConfig};
pub use rate_limit::SlidingWindowCounter;
pub use ws_pool::{WsEndpoint, WsManager, WsState, WsStateMachine, WsTuning};

use crate::types::RpcConfig;
use std::sync::Arc;

/// Everything a chain worker needs to talk to its chain. Holds one
/// `HttpPool` and (if configured) one `WsManager`, both owned exclusively
/// by this transport instance — nothing here is shared across chains.
pub struct TransportPool {
    pub http: HttpPool,
    pub ws: Option<Arc<WsManager>>,
}

impl TransportPool {
    pub fn new(rpc: &RpcConfig) -> Result<Self, crate::error::CoreError> {
        let http = HttpPool::connect(
            &rpc.http,
            HttpPoolConfig {
                max_requests_per_minute: rpc.max_requests_per_minute,
                request_delay_ms: rpc.request_delay_ms,
                retry_attempts: rpc.retry_attempts,
                retry_delay_ms: rpc.retry_delay_ms,
            },
        )?;
        let ws = if rpc.ws.is_empty() {
            None
        } else {
            Some(Arc::new(WsManager::new(&rpc.ws, WsTuning::default())))
        };
        Ok(Self { http, ws })
    }

    pub fn shutdown(&self) {
        if let Some(ws) = &self.ws {
            ws.shutdown();
        }
    }
}
