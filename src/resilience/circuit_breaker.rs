//! # Circuit Breaker Implementation
//!
//! Fail-fast protection for the store. Three states: Closed (normal
//! operation), Open (failing fast), and Half-Open (testing recovery).
//!
//! Callers drive it manually: ask [`CircuitBreaker::should_allow`] before a
//! store call, then report the outcome with `record_success` or
//! `record_failure`.

use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Snapshot of breaker counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u64,
}

/// Lock-free circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU64,
    half_open_calls: AtomicU64,
    /// Nanoseconds since `created` at which the circuit last opened
    opened_at_nanos: AtomicU64,
    created: Instant,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_seconds = config.open_duration.as_secs(),
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            half_open_calls: AtomicU64::new(0),
            opened_at_nanos: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a call may go through right now
    ///
    /// An open circuit moves to half-open once `open_duration` has elapsed.
    pub fn should_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened = Duration::from_nanos(self.opened_at_nanos.load(Ordering::Acquire));
                if self.created.elapsed().saturating_sub(opened) >= self.config.open_duration {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                self.half_open_calls.load(Ordering::Relaxed)
                    < u64::from(self.config.success_threshold)
            }
        }
    }

    pub fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Store operation succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                let calls = self.half_open_calls.fetch_add(1, Ordering::Relaxed) + 1;
                if calls >= u64::from(self.config.success_threshold) {
                    self.transition_to_closed();
                }
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Store operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= u64::from(self.config.failure_threshold) {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Open => {}
        }
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            state: self.state(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Force circuit to open state
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        self.transition_to_open();
    }

    /// Force circuit to closed state
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        self.transition_to_closed();
    }

    fn transition_to_closed(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.half_open_calls.store(0, Ordering::Relaxed);

        info!(component = %self.name, "Circuit breaker closed (recovered)");
    }

    fn transition_to_open(&self) {
        let now = self.created.elapsed().as_nanos() as u64;
        self.opened_at_nanos.store(now, Ordering::Release);
        self.half_open_calls.store(0, Ordering::Relaxed);
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        warn!(
            component = %self.name,
            consecutive_failures = self.consecutive_failures.load(Ordering::Relaxed),
            timeout_seconds = self.config.open_duration.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_half_open(&self) {
        self.half_open_calls.store(0, Ordering::Relaxed);
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        info!(component = %self.name, "Circuit breaker half-open (testing recovery)");
    }
}
