//! # Resilience Module
//!
//! Circuit breaker protection for distributed stores. When the store keeps
//! failing, the breaker opens and store calls fail fast, so the caching core
//! falls back to direct computation without paying a network timeout per call.

pub mod circuit_breaker;
pub mod config;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use config::CircuitBreakerConfig;
