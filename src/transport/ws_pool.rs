//! WebSocket block-stream sub-pool (§4.1).
//!
//! Per-endpoint state machine `{Disconnected, Connecting, Connected,
//! Reconnecting, CircuitOpen}` driven by an async task shaped after the
//! teacher's mempool reconnect loop (`mempool/monitor.rs`), generalized
//! into the full contract the spec demands: heartbeats, adaptive backoff,
//! proactive refresh, and primary/failover designation across endpoints.

use crate::error::CoreError;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    CircuitOpen,
}

#[derive(Debug, Clone)]
pub struct WsTuning {
    pub initial_connection_timeout_ms: u64,
    pub initial_connection_retries: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub jitter_factor: f64,
    pub max_reconnect_attempts: u32,
    pub circuit_breaker_cooldown_ms: u64,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub failover_delay_ms: u64,
}

impl Default for WsTuning {
    fn default() -> Self {
        Self {
            initial_connection_timeout_ms: 15_000,
            initial_connection_retries: 5,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 60_000,
            jitter_factor: 0.2,
            max_reconnect_attempts: 10,
            circuit_breaker_cooldown_ms: 5 * 60_000,
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 5,
            refresh_interval_secs: 30 * 60,
            failover_delay_ms: 500,
        }
    }
}

/// Pure transition logic for one endpoint, kept separate from the async
/// driver so it can be unit tested without a network.
#[derive(Debug)]
pub struct WsStateMachine {
    pub state: WsState,
    pub consecutive_429s: u32,
    pub reconnect_attempts: u32,
    pub heartbeat_failures: u32,
    pub circuit_opened_at: Option<Instant>,
    pub score: f64,
    pub avg_latency_ms: f64,
    tuning: WsTuning,
}

impl WsStateMachine {
    pub fn new(tuning: WsTuning) -> Self {
        Self {
            state: WsState::Disconnected,
            consecutive_429s: 0,
            reconnect_attempts: 0,
            heartbeat_failures: 0,
            circuit_opened_at: None,
            score: 100.0,
            avg_latency_ms: 0.0,
            tuning,
        }
    }

    pub fn begin_connecting(&mut self) {
        self.state = WsState::Connecting;
    }

    pub fn on_connect_success(&mut self) {
        self.state = WsState::Connected;
        self.reconnect_attempts = 0;
        self.consecutive_429s = 0;
        self.heartbeat_failures = 0;
        self.score = (self.score + 5.0).min(100.0);
    }

    pub fn on_rate_limited(&mut self) {
        self.consecutive_429s += 1;
    }

    pub fn on_error_or_close(&mut self) {
        self.state = WsState::Reconnecting;
        self.score = (self.score - 20.0).max(0.0);
    }

    pub fn on_heartbeat_failure(&mut self) {
        self.heartbeat_failures += 1;
        if self.heartbeat_failures >= 2 {
            self.on_error_or_close();
        }
    }

    pub fn on_heartbeat_success(&mut self, latency: Duration) {
        self.heartbeat_failures = 0;
        let ms = latency.as_secs_f64() * 1000.0;
        self.avg_latency_ms = if self.avg_latency_ms == 0.0 {
            ms
        } else {
            self.avg_latency_ms * 0.8 + ms * 0.2
        };
    }

    /// `Reconnecting → Connecting` delay: `base * 2^attempts + random *
    /// jitter_factor`, capped at `reconnect_max_delay_ms`. Adaptive: base
    /// doubles per frame error (handled by caller via `frame_error`
    /// doubling `base` before calling this), and is multiplied by
    /// `2^consecutive_429s` (capped at 5 minutes) on rate-limit errors.
    pub fn compute_reconnect_delay(&self) -> Duration {
        let mut base = self.tuning.reconnect_base_delay_ms as f64;
        if self.consecutive_429s > 0 {
            let multiplier = 2f64.powi(self.consecutive_429s as i32);
            base = (base * multiplier).min(5.0 * 60_000.0);
        }
        let exp = base * 2f64.powi(self.reconnect_attempts as i32);
        let mut rng = rand::thread_rng();
        let jitter = rng.gen::<f64>() * self.tuning.jitter_factor * exp;
        let total = (exp + jitter).min(self.tuning.reconnect_max_delay_ms as f64);
        Duration::from_millis(total as u64)
    }

    pub fn record_reconnect_attempt(&mut self) {
        self.reconnect_attempts += 1;
        if self.reconnect_attempts >= self.tuning.max_reconnect_attempts {
            self.state = WsState::CircuitOpen;
            self.circuit_opened_at = Some(Instant::now());
        } else {
            self.state = WsState::Connecting;
        }
    }

    pub fn circuit_can_close(&self, now: Instant) -> bool {
        match self.circuit_opened_at {
            Some(opened) => {
                now.duration_since(opened).as_millis()
                    >= self.tuning.circuit_breaker_cooldown_ms as u128
            }
            None => true,
        }
    }

    pub fn close_circuit(&mut self) {
        self.state = WsState::Disconnected;
        self.reconnect_attempts = 0;
        self.consecutive_429s = 0;
        self.circuit_opened_at = None;
    }

    pub fn should_refresh(&self, connected_since: Instant, now: Instant) -> bool {
        self.state == WsState::Connected
            && now.duration_since(connected_since).as_secs() >= self.tuning.refresh_interval_secs
    }
}

/// One endpoint's async driver: connects, subscribes to new heads,
/// forwards block numbers, runs heartbeats, and reconnects per the state
/// machine above. Every suspension point (connect, subscribe read,
/// reconnect sleep) is cancellation-safe via `shutdown`.
pub struct WsEndpoint {
    pub url: String,
    pub machine: Mutex<WsStateMachine>,
    pub last_block: AtomicU64,
    shutdown: Arc<Notify>,
    shutdown_flag: Arc<std::sync::atomic::AtomicBool>,
}

impl WsEndpoint {
    pub fn new(url: String, tuning: WsTuning) -> Self {
        Self {
            url,
            machine: Mutex::new(WsStateMachine::new(tuning)),
            last_block: AtomicU64::new(0),
            shutdown: Arc::new(Notify::new()),
            shutdown_flag: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Runs until `shutdown()` is called. Publishes block numbers to
    /// `tx`; caller (the manager) decides whether this endpoint is primary.
    pub async fn run(self: Arc<Self>, tx: broadcast::Sender<(String, u64)>) {
        loop {
            if self.is_shutting_down() {
                return;
            }
            {
                let mut m = self.machine.lock().await;
                m.begin_connecting();
            }
            match self.connect_and_stream(&tx).await {
                Ok(()) => {}
                Err(e) => debug!("ws endpoint {} stream ended: {e}", self.url),
            }
            if self.is_shutting_down() {
                return;
            }
            let (state, delay) = {
                let mut m = self.machine.lock().await;
                m.on_error_or_close();
                m.record_reconnect_attempt();
                (m.state, m.compute_reconnect_delay())
            };
            if state == WsState::CircuitOpen {
                warn!("ws endpoint {} circuit open, cooling down", self.url);
                loop {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    if self.is_shutting_down() {
                        return;
                    }
                    let mut m = self.machine.lock().await;
                    if m.circuit_can_close(Instant::now()) {
                        m.close_circuit();
                        break;
                    }
                }
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.notified() => return,
            }
        }
    }

    async fn connect_and_stream(
        &self,
        tx: &broadcast::Sender<(String, u64)>,
    ) -> Result<(), CoreError> {
        let connect_fut = ProviderBuilder::new().connect_ws(WsConnect::new(&self.url));
        let provider = tokio::time::timeout(
            Duration::from_millis(
                self.machine
                    .lock()
                    .await
                    .tuning
                    .initial_connection_timeout_ms,
            ),
            connect_fut,
        )
        .await
        .map_err(|_| CoreError::WsHandshakeFailed {
            endpoint: self.url.clone(),
            attempts: 1,
        })?
        .map_err(|e| CoreError::WsHandshakeFailed {
            endpoint: self.url.clone(),
            attempts: 1,
        })
        .map_err(|e| {
            warn!("ws connect failed for {}: unable to establish handshake", self.url);
            e
        })?;

        {
            let mut m = self.machine.lock().await;
            m.on_connect_success();
        }
        info!("ws endpoint {} connected", self.url);

        let mut block_stream = provider
            .subscribe_blocks()
            .await
            .map_err(|_| CoreError::WsFrameError {
                endpoint: self.url.clone(),
                message: "subscribe_blocks failed".into(),
            })?
            .into_stream();

        let connected_since = Instant::now();
        let mut heartbeat = tokio::time::interval(Duration::from_secs(
            self.machine.lock().await.tuning.heartbeat_interval_secs,
        ));

        use futures::StreamExt;
        loop {
            if self.is_shutting_down() {
                return Ok(());
            }
            tokio::select! {
                maybe_header = block_stream.next() => {
                    match maybe_header {
                        Some(header) => {
                            self.last_block.store(header.number, Ordering::SeqCst);
                            let _ = tx.send((self.url.clone(), header.number));
                        }
                        None => return Ok(()),
                    }
                }
                _ = heartbeat.tick() => {
                    let start = Instant::now();
                    let probe = tokio::time::timeout(
                        Duration::from_secs(self.machine.lock().await.tuning.heartbeat_timeout_secs),
                        provider.get_block_number(),
                    ).await;
                    let mut m = self.machine.lock().await;
                    match probe {
                        Ok(Ok(_)) => m.on_heartbeat_success(start.elapsed()),
                        _ => {
                            m.on_heartbeat_failure();
                            if m.state == WsState::Reconnecting {
                                drop(m);
                                return Ok(());
                            }
                        }
                    }
                }
                _ = self.shutdown.notified() => return Ok(()),
            }

            let should_refresh = {
                let m = self.machine.lock().await;
                m.should_refresh(connected_since, Instant::now())
            };
            if should_refresh {
                info!("ws endpoint {} proactive refresh", self.url);
                return Ok(());
            }
        }
    }
}

/// Debounces the "every endpoint is down" signal to fire exactly once per
/// outage (§4.1, §7, testable property: "the manager emits exactly one
/// `all_endpoints_down` event per outage"). Kept as pure state, separate
/// from the async driver, the same way `WsStateMachine` is.
#[derive(Debug, Default)]
struct AllDownTracker {
    fired: bool,
}

impl AllDownTracker {
    /// Feeds the current state of every endpoint. Returns `true` exactly
    /// once when all endpoints are first observed `CircuitOpen`
    /// simultaneously; resets (and can fire again) once any endpoint
    /// leaves `CircuitOpen`.
    fn observe(&mut self, states: &[WsState]) -> bool {
        let all_down = !states.is_empty() && states.iter().all(|s| *s == WsState::CircuitOpen);
        if !all_down {
            self.fired = false;
            return false;
        }
        if self.fired {
            return false;
        }
        self.fired = true;
        true
    }
}

/// Holds N endpoints (typically <= 2), designates one primary, and
/// forwards block events only from the primary to avoid duplicates.
pub struct WsManager {
    endpoints: Vec<Arc<WsEndpoint>>,
    primary_idx: Mutex<usize>,
    debounce_lock: Mutex<()>,
    all_down: Mutex<AllDownTracker>,
    tuning: WsTuning,
}

impl WsManager {
    pub fn new(urls: &[String], tuning: WsTuning) -> Self {
        let endpoints = urls
            .iter()
            .map(|u| Arc::new(WsEndpoint::new(u.clone(), tuning.clone())))
            .collect();
        Self {
            endpoints,
            primary_idx: Mutex::new(0),
            debounce_lock: Mutex::new(()),
            all_down: Mutex::new(AllDownTracker::default()),
            tuning,
        }
    }

    /// Spawns one task per endpoint and returns a stream of block numbers
    /// forwarded only from the current primary.
    pub fn spawn(self: Arc<Self>) -> broadcast::Receiver<u64> {
        let (raw_tx, mut raw_rx) = broadcast::channel(1024);
        let (block_tx, block_rx) = broadcast::channel(1024);

        for ep in &self.endpoints {
            let ep = Arc::clone(ep);
            let raw_tx = raw_tx.clone();
            tokio::spawn(async move {
                ep.run(raw_tx).await;
            });
        }

        let manager = Arc::clone(&self);
        tokio::spawn(async move {
            let mut all_down_check = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    received = raw_rx.recv() => {
                        match received {
                            Ok((url, block)) => {
                                let primary_url = {
                                    let idx = *manager.primary_idx.lock().await;
                                    manager.endpoints[idx].url.clone()
                                };
                                if url == primary_url {
                                    let _ = block_tx.send(block);
                                } else {
                                    manager.maybe_failover(&url).await;
                                }
                            }
                            Err(broadcast::error::RecvError::Closed) => return,
                            Err(broadcast::error::RecvError::Lagged(_)) => {}
                        }
                    }
                    _ = all_down_check.tick() => {
                        manager.check_all_down().await;
                    }
                }
            }
        });

        block_rx
    }

    /// Aggregates every endpoint's state and, via `AllDownTracker`, emits
    /// exactly one `all_endpoints_down` event per outage. A WS outage is
    /// recoverable entirely by the existing per-endpoint reconnect/circuit
    /// logic, so this only logs — there is nothing else to gate on it.
    async fn check_all_down(&self) {
        let mut states = Vec::with_capacity(self.endpoints.len());
        for ep in &self.endpoints {
            states.push(ep.machine.lock().await.state);
        }
        if self.all_down.lock().await.observe(&states) {
            warn!(
                endpoints = self.endpoints.len(),
                "all websocket endpoints down (all circuits open)"
            );
        }
    }

    /// A non-primary endpoint exceeding the primary by >= 20 points while
    /// the primary is below 80 triggers a proactive switch; a disconnected
    /// primary triggers a debounced failover to the best connected
    /// alternative.
    async fn maybe_failover(&self, candidate_url: &str) {
        let _debounce = self.debounce_lock.lock().await;
        tokio::time::sleep(Duration::from_millis(self.tuning.failover_delay_ms)).await;

        let mut best_idx = None;
        let mut best_score = -1.0;
        for (i, ep) in self.endpoints.iter().enumerate() {
            let m = ep.machine.lock().await;
            if m.state == WsState::Connected && m.score > best_score {
                best_score = m.score;
                best_idx = Some(i);
            }
        }
        let Some(best_idx) = best_idx else { return };

        let mut primary_idx = self.primary_idx.lock().await;
        let primary_state = self.endpoints[*primary_idx].machine.lock().await.state;
        let primary_score = self.endpoints[*primary_idx].machine.lock().await.score;

        let primary_down = primary_state != WsState::Connected;
        let proactive_switch = best_idx != *primary_idx
            && best_score - primary_score >= 20.0
            && primary_score < 80.0;

        if (primary_down || proactive_switch) && best_idx != *primary_idx {
            info!(
                "ws manager: switching primary from {} to {}",
                self.endpoints[*primary_idx].url, self.endpoints[best_idx].url
            );
            *primary_idx = best_idx;
        }
        let _ = candidate_url;
    }

    pub fn shutdown(&self) {
        for ep in &self.endpoints {
            ep.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_consecutive_heartbeat_failures_force_reconnect() {
        let mut m = WsStateMachine::new(WsTuning::default());
        m.on_connect_success();
        assert_eq!(m.state, WsState::Connected);
        m.on_heartbeat_failure();
        assert_eq!(m.state, WsState::Connected);
        m.on_heartbeat_failure();
        assert_eq!(m.state, WsState::Reconnecting);
    }

    #[test]
    fn circuit_opens_after_max_reconnect_attempts() {
        let mut m = WsStateMachine::new(WsTuning {
            max_reconnect_attempts: 3,
            ..WsTuning::default()
        });
        for _ in 0..3 {
            m.record_reconnect_attempt();
        }
        assert_eq!(m.state, WsState::CircuitOpen);
        assert!(m.circuit_opened_at.is_some());
    }

    #[test]
    fn circuit_closes_only_after_cooldown_elapses() {
        let mut m = WsStateMachine::new(WsTuning {
            max_reconnect_attempts: 1,
            circuit_breaker_cooldown_ms: 100,
            ..WsTuning::default()
        });
        m.record_reconnect_attempt();
        assert!(!m.circuit_can_close(Instant::now()));
        let later = Instant::now() + Duration::from_millis(150);
        assert!(m.circuit_can_close(later));
    }

    #[test]
    fn reconnect_delay_is_capped_at_max() {
        let m = WsStateMachine::new(WsTuning {
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 5_000,
            ..WsTuning::default()
        });
        let mut m2 = m;
        m2.reconnect_attempts = 20;
        let delay = m2.compute_reconnect_delay();
        assert!(delay.as_millis() as u64 <= 5_000);
    }

    #[test]
    fn all_down_tracker_fires_exactly_once_per_outage() {
        let mut tracker = AllDownTracker::default();
        let all_open = [WsState::CircuitOpen, WsState::CircuitOpen];
        assert!(tracker.observe(&all_open));
        assert!(!tracker.observe(&all_open), "must not re-fire while still down");
        assert!(!tracker.observe(&all_open));

        let recovered = [WsState::Connected, WsState::CircuitOpen];
        assert!(!tracker.observe(&recovered));

        assert!(tracker.observe(&all_open), "fires again for a fresh outage");
    }

    #[test]
    fn all_down_tracker_ignores_empty_endpoint_list() {
        let mut tracker = AllDownTracker::default();
        assert!(!tracker.observe(&[]));
    }

    #[test]
    fn rate_limit_errors_increase_reconnect_delay() {
        let mut baseline = WsStateMachine::new(WsTuning::default());
        let mut limited = WsStateMachine::new(WsTuning::default());
        limited.consecutive_429s = 3;
        assert!(limited.compute_reconnect_delay() >= baseline.compute_reconnect_delay());
        baseline.reconnect_attempts = 0;
    }
}
