//! Store trait definition

use super::errors::StoreResult;
use std::future::Future;
use std::time::Duration;

/// Key-value store with a lease primitive for single-flight coordination
///
/// Implemented by the concrete providers (Redis, Moka, NoOp) and by
/// [`StoreProvider`](super::StoreProvider), which dispatches to one of them.
/// Values are complete serialized entries; a `set` either stores the whole
/// value or nothing.
pub trait CacheStore: Send + Sync {
    /// Get a value by key
    ///
    /// Returns `Ok(Some(value))` on hit, `Ok(None)` on miss.
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    /// Store a value that expires after `ttl`
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Delete a specific key
    fn delete(&self, key: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Delete all keys matching a glob pattern, returning how many were removed
    fn delete_pattern(&self, pattern: &str) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Atomically create the lease `lock_key` owned by `holder_token` iff no
    /// lease exists. Returns `Ok(false)` when somebody else holds it.
    fn try_acquire_lease(
        &self,
        lock_key: &str,
        holder_token: &str,
        ttl: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Remove the lease iff it is still owned by `holder_token`
    ///
    /// Idempotent: releasing an expired lease, or one that now belongs to a
    /// different holder, succeeds without touching anything.
    fn release_lease(
        &self,
        lock_key: &str,
        holder_token: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Check if the store backend is healthy
    fn health_check(&self) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Name of the store provider
    fn provider_name(&self) -> &'static str;

    /// Whether state is shared across processes
    fn is_distributed(&self) -> bool;
}
