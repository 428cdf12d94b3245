//! `EndpointHealth` — owned exclusively by the transport pool, mutated
//! only by pool internals (§3, §5).

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Http,
    Ws,
}

#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub url: String,
    pub kind: EndpointKind,
    pub score: f64,
    pub failure_count: u32,
    pub unhealthy_since: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    pub last_check: Option<Instant>,
    pub avg_latency_ms: f64,
}

impl EndpointHealth {
    pub fn new(url: String, kind: EndpointKind) -> Self {
        Self {
            url,
            kind,
            score: 100.0,
            failure_count: 0,
            unhealthy_since: None,
            cooldown_until: None,
            last_check: None,
            avg_latency_ms: 0.0,
        }
    }

    /// `healthy = (cooldown_until <= now && failure_count < 3) || cooldown passed`
    pub fn is_healthy(&self, now: Instant) -> bool {
        let cooldown_passed = self.cooldown_until.map(|t| now >= t).unwrap_or(true);
        cooldown_passed && self.failure_count < 3
    }

    pub fn record_success(&mut self, latency: Duration, now: Instant) {
        self.score = (self.score + 5.0).min(100.0);
        self.failure_count = 0;
        self.unhealthy_since = None;
        self.last_check = Some(now);
        let latency_ms = latency.as_secs_f64() * 1000.0;
        self.avg_latency_ms = if self.avg_latency_ms == 0.0 {
            latency_ms
        } else {
            self.avg_latency_ms * 0.8 + latency_ms * 0.2
        };
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.score = (self.score - 20.0).max(0.0);
        self.failure_count += 1;
        self.last_check = Some(now);
        if self.failure_count >= 3 && self.unhealthy_since.is_none() {
            self.unhealthy_since = Some(now);
        }
    }

    pub fn enter_cooldown(&mut self, duration: Duration, now: Instant) {
        self.cooldown_until = Some(now + duration);
        self.record_failure(now);
    }

    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.unhealthy_since = None;
        self.cooldown_until = None;
        self.score = 100.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_failures_mark_unhealthy() {
        let mut h = EndpointHealth::new("x".into(), EndpointKind::Http);
        let now = Instant::now();
        assert!(h.is_healthy(now));
        h.record_failure(now);
        h.record_failure(now);
        assert!(h.is_healthy(now));
        h.record_failure(now);
        assert!(!h.is_healthy(now));
    }

    #[test]
    fn score_is_capped_at_100_and_floored_at_0() {
        let mut h = EndpointHealth::new("x".into(), EndpointKind::Http);
        let now = Instant::now();
        for _ in 0..10 {
            h.record_success(Duration::from_millis(10), now);
        }
        assert_eq!(h.score, 100.0);
        for _ in 0..20 {
            h.record_failure(now);
        }
        assert_eq!(h.score, 0.0);
    }

    #[test]
    fn cooldown_gates_health_until_expiry() {
        let mut h = EndpointHealth::new("x".into(), EndpointKind::Http);
        let now = Instant::now();
        h.enter_cooldown(Duration::from_secs(60), now);
        assert!(!h.is_healthy(now));
        assert!(h.is_healthy(now + Duration::from_secs(61)));
    }

    #[test]
    fn reset_restores_full_health() {
        let mut h = EndpointHealth::new("x".into(), EndpointKind::Http);
        let now = Instant::now();
        h.record_failure(now);
        h.record_failure(now);
        h.record_failure(now);
        h.reset();
        assert!(h.is_healthy(now));
        assert_eq!(h.score, 100.0);
    }
}
