//! Breaker thresholds for the store guard.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds and cool-down for one store circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive store failures that open the circuit
    pub failure_threshold: u32,

    /// How long an open circuit rejects store calls before probing again
    pub open_duration: Duration,

    /// Half-open probes that must succeed before the circuit closes
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    /// Longest allowed cool-down. Past this a recovered store would sit
    /// unused while every call recomputes.
    pub const MAX_OPEN_DURATION: Duration = Duration::from_secs(300);

    pub fn validate(&self) -> Result<(), String> {
        match (self.failure_threshold, self.success_threshold) {
            (0, _) => Err("failure_threshold must be greater than 0".to_string()),
            (_, 0) => Err("success_threshold must be greater than 0".to_string()),
            _ if self.open_duration.is_zero() => {
                Err("open duration must be greater than 0".to_string())
            }
            _ if self.open_duration > Self::MAX_OPEN_DURATION => Err(format!(
                "open duration must not exceed {}s",
                Self::MAX_OPEN_DURATION.as_secs()
            )),
            _ => Ok(()),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}
