//! Circuit breaker over provider calls — consecutive-failure state machine.
//!
//! A `DashMap` keyed by provider name with `entry().or_insert_with()`
//! updates; transitions are driven by a simple consecutive-failure count
//! rather than a rolling-window success ratio.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

const FAILURE_THRESHOLD: u32 = 5;
const OPEN_DURATION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerEntry {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// A half-open probe has been handed out and not yet resolved.
    probe_in_flight: bool,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn state(&self) -> BreakerState {
        match self.opened_at {
            None => BreakerState::Closed,
            Some(opened_at) => {
                if opened_at.elapsed() >= OPEN_DURATION {
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open
                }
            }
        }
    }
}

/// Per-provider circuit breaker table, shared across `alicia-engine` turns.
pub struct CircuitBreaker {
    entries: DashMap<String, BreakerEntry>,
}

impl CircuitBreaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
        })
    }

    /// Whether a call to `provider` may proceed right now. In `HalfOpen`,
    /// exactly one caller is permitted through until it resolves.
    pub fn call_permitted(&self, provider: &str) -> bool {
        let mut entry = self
            .entries
            .entry(provider.to_string())
            .or_insert_with(BreakerEntry::new);
        match entry.state() {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if entry.probe_in_flight {
                    false
                } else {
                    entry.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self, provider: &str) {
        let mut entry = self
            .entries
            .entry(provider.to_string())
            .or_insert_with(BreakerEntry::new);
        entry.consecutive_failures = 0;
        entry.opened_at = None;
        entry.probe_in_flight = false;
    }

    pub fn record_failure(&self, provider: &str) {
        let mut entry = self
            .entries
            .entry(provider.to_string())
            .or_insert_with(BreakerEntry::new);
        let was_half_open = entry.state() == BreakerState::HalfOpen;
        entry.probe_in_flight = false;
        if was_half_open {
            entry.opened_at = Some(Instant::now());
            return;
        }
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= FAILURE_THRESHOLD {
            entry.opened_at = Some(Instant::now());
        }
    }

    pub fn state_of(&self, provider: &str) -> BreakerState {
        self.entries
            .entry(provider.to_string())
            .or_insert_with(BreakerEntry::new)
            .state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_to_open_after_five_failures() {
        let breaker = CircuitBreaker::new();
        for _ in 0..4 {
            breaker.record_failure("p1");
            assert_eq!(breaker.state_of("p1"), BreakerState::Closed);
        }
        breaker.record_failure("p1");
        assert_eq!(breaker.state_of("p1"), BreakerState::Open);
    }

    #[test]
    fn open_rejects_calls_before_timeout() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure("p1");
        }
        assert!(!breaker.call_permitted("p1"));
    }

    #[test]
    fn half_open_allows_single_probe() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure("p1");
        }
        {
            let mut entry = breaker.entries.get_mut("p1").unwrap();
            entry.opened_at = Some(Instant::now() - OPEN_DURATION - Duration::from_secs(1));
        }
        assert_eq!(breaker.state_of("p1"), BreakerState::HalfOpen);
        assert!(breaker.call_permitted("p1"));
        assert!(!breaker.call_permitted("p1"));
    }

    #[test]
    fn half_open_success_closes() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure("p1");
        }
        {
            let mut entry = breaker.entries.get_mut("p1").unwrap();
            entry.opened_at = Some(Instant::now() - OPEN_DURATION - Duration::from_secs(1));
        }
        assert!(breaker.call_permitted("p1"));
        breaker.record_success("p1");
        assert_eq!(breaker.state_of("p1"), BreakerState::Closed);
        assert!(breaker.call_permitted("p1"));
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure("p1");
        }
        {
            let mut entry = breaker.entries.get_mut("p1").unwrap();
            entry.opened_at = Some(Instant::now() - OPEN_DURATION - Duration::from_secs(1));
        }
        assert!(breaker.call_permitted("p1"));
        breaker.record_failure("p1");
        assert_eq!(breaker.state_of("p1"), BreakerState::Open);
    }
}
