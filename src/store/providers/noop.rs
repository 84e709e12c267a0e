//! No-op store provider
//!
//! Always misses, every write succeeds. Used when caching is disabled or when
//! the configured backend is unavailable at startup (graceful degradation).

use crate::store::errors::StoreResult;
use crate::store::traits::CacheStore;
use std::time::Duration;

/// Store that never keeps anything
///
/// Leases are always granted because there is nothing to coordinate: with no
/// shared state every caller computes for itself.
#[derive(Debug, Clone, Default)]
pub struct NoOpStore;

impl NoOpStore {
    pub fn new() -> Self {
        Self
    }
}

impl CacheStore for NoOpStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn delete_pattern(&self, _pattern: &str) -> StoreResult<u64> {
        Ok(0)
    }

    async fn try_acquire_lease(
        &self,
        _lock_key: &str,
        _holder_token: &str,
        _ttl: Duration,
    ) -> StoreResult<bool> {
        Ok(true)
    }

    async fn release_lease(&self, _lock_key: &str, _holder_token: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }

    fn is_distributed(&self) -> bool {
        // No state, so nothing can diverge between instances
        true
    }
}
