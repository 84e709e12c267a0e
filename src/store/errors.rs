//! Store error types

use thiserror::Error;

/// Errors raised by a cache store backend
///
/// Every variant is an infrastructure failure. Under a high-availability
/// policy the caching core abandons the lookup and runs the callable directly.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the store backend
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Store operation timed out
    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    /// Circuit breaker is rejecting calls to the backend
    #[error("Cache circuit open for {component}")]
    CircuitOpen { component: String },

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
