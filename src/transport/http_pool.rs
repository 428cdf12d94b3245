//! HTTP JSON-RPC sub-pool (§4.1).
//!
//! Round-robin across healthy, non-cooldown, under-budget endpoints.
//! Explicitly does NOT reproduce the "always prefer one provider" anti-pattern
//! the spec calls out — selection always advances the round-robin cursor.

use crate::error::{CoreError, CoreResult};
use crate::transport::rate_limit::SlidingWindowCounter;
use crate::types::{EndpointHealth, EndpointKind};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct HttpEndpoint {
    url: String,
    provider: DynProvider,
    health: Mutex<EndpointHealth>,
    limiter: Mutex<SlidingWindowCounter>,
}

pub struct HttpPoolConfig {
    pub max_requests_per_minute: u32,
    pub request_delay_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

/// A single logical JSON-RPC channel over a heterogeneous, fallible set of
/// HTTP endpoints.
pub struct HttpPool {
    endpoints: Vec<HttpEndpoint>,
    cursor: AtomicU64,
    last_request_at: Mutex<Option<Instant>>,
    config: HttpPoolConfig,
}

impl HttpPool {
    /// Connects one provider per URL. Construction fails only if every URL
    /// is unparseable — a per-URL parse failure is logged and skipped so a
    /// single bad entry doesn't take the whole pool down.
    pub fn connect(urls: &[String], config: HttpPoolConfig) -> CoreResult<Self> {
        let mut endpoints = Vec::with_capacity(urls.len());
        for url in urls {
            match url.parse() {
                Ok(parsed) => {
                    let provider = ProviderBuilder::new().connect_http(parsed).erased();
                    endpoints.push(HttpEndpoint {
                        url: url.clone(),
                        provider,
                        health: Mutex::new(EndpointHealth::new(url.clone(), EndpointKind::Http)),
                        limiter: Mutex::new(SlidingWindowCounter::new()),
                    });
                }
                Err(e) => warn!("skipping unparseable HTTP endpoint {url}: {e}"),
            }
        }
        if endpoints.is_empty() {
            return Err(CoreError::ConfigError {
                message: "no valid HTTP endpoints configured".into(),
            });
        }
        Ok(Self {
            endpoints,
            cursor: AtomicU64::new(0),
            last_request_at: Mutex::new(None),
            config,
        })
    }

    /// Global budget cap: `min(sum(per-endpoint) * 0.8, 1000)` rpm (§4.1).
    fn global_budget(&self) -> u32 {
        let sum: u32 = self
            .endpoints
            .iter()
            .map(|_| self.config.max_requests_per_minute)
            .sum();
        ((sum as f64) * 0.8).min(1000.0) as u32
    }

    fn global_in_flight(&self, now: Instant) -> u32 {
        self.endpoints
            .iter()
            .map(|e| e.limiter.lock().unwrap().current_count(now))
            .sum()
    }

    /// Picks the next healthy, under-budget endpoint starting from the
    /// round-robin cursor, advancing the cursor regardless of outcome.
    fn select_endpoint(&self, now: Instant) -> Option<usize> {
        let n = self.endpoints.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) as usize % n;
        if self.global_in_flight(now) >= self.global_budget() {
            return None;
        }
        for offset in 0..n {
            let idx = (start + offset) % n;
            let ep = &self.endpoints[idx];
            let healthy = ep.health.lock().unwrap().is_healthy(now);
            if !healthy {
                continue;
            }
            let under_budget = ep
                .limiter
                .lock()
                .unwrap()
                .can_make_request(self.config.max_requests_per_minute, now);
            if under_budget {
                return Some(idx);
            }
        }
        None
    }

    async fn throttle(&self) {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let wait = {
            let mut guard = self.last_request_at.lock().unwrap();
            let now = Instant::now();
            let wait = match *guard {
                Some(prev) if now.duration_since(prev) < delay => delay - now.duration_since(prev),
                _ => Duration::ZERO,
            };
            *guard = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Selects a provider, throttles, executes, and on failure retries up
    /// to `retry_attempts` with exponential backoff
    /// (`retry_delay * 2^attempt`). If every endpoint is unhealthy, resets
    /// failure counts (degraded mode) and retries once more.
    pub async fn with_retry<F, Fut, T>(&self, f: F) -> CoreResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let mut last_err = String::new();
        for attempt in 0..self.config.retry_attempts.max(1) {
            self.throttle().await;
            let now = Instant::now();
            let idx = match self.select_endpoint(now) {
                Some(idx) => idx,
                None => {
                    if self
                        .endpoints
                        .iter()
                        .all(|e| !e.health.lock().unwrap().is_healthy(now))
                    {
                        warn!("all HTTP endpoints unhealthy — resetting to degraded mode");
                        for e in &self.endpoints {
                            e.health.lock().unwrap().reset();
                        }
                        continue;
                    }
                    last_err = "no under-budget endpoint available".to_string();
                    self.backoff(attempt).await;
                    continue;
                }
            };
            let ep = &self.endpoints[idx];
            ep.limiter.lock().unwrap().record(now);
            let call_start = Instant::now();
            match f(ep.provider.clone()).await {
                Ok(value) => {
                    ep.health
                        .lock()
                        .unwrap()
                        .record_success(call_start.elapsed(), Instant::now());
                    return Ok(value);
                }
                Err(message) => {
                    let now2 = Instant::now();
                    if CoreError::rate_limit_matches(&message) {
                        ep.health.lock().unwrap().enter_cooldown(Duration::from_secs(60), now2);
                        debug!("endpoint {} rate limited: {message}", ep.url);
                    } else {
                        ep.health.lock().unwrap().record_failure(now2);
                        debug!("endpoint {} attempt {attempt} failed: {message}", ep.url);
                    }
                    last_err = message;
                    self.backoff(attempt).await;
                }
            }
        }
        Err(CoreError::TransportExhausted {
            attempts: self.config.retry_attempts,
            message: last_err,
        })
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.config.retry_delay_ms * 2u64.pow(attempt);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Background self-healing probe (§4.1): run every 5 minutes, probes
    /// each unhealthy endpoint with a trivial `eth_blockNumber` call.
    pub async fn self_heal_once(&self) {
        for ep in &self.endpoints {
            let was_unhealthy = !ep.health.lock().unwrap().is_healthy(Instant::now());
            if !was_unhealthy {
                continue;
            }
            let probe = tokio::time::timeout(Duration::from_secs(5), ep.provider.get_block_number()).await;
            match probe {
                Ok(Ok(_)) => {
                    ep.health.lock().unwrap().reset();
                    debug!("self-heal: endpoint {} restored", ep.url);
                }
                _ => debug!("self-heal: endpoint {} still unhealthy", ep.url),
            }
        }
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn healthy_count(&self) -> usize {
        let now = Instant::now();
        self.endpoints
            .iter()
            .filter(|e| e.health.lock().unwrap().is_healthy(now))
            .count()
    }
}
