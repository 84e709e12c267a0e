//! # Caching Core
//!
//! Read-through decision engine. For each call:
//!
//! ```text
//! resolve policy ── none ──────────────────────────────► invoke (Bypassed)
//!      │
//! derive key ─► read entry ── decodes ─────────────────► Hit
//!                   │  └───── corrupt ─► evict ─┐
//!                   ▼                           ▼
//!                  miss ── single_flight off ─► invoke, write back (Computed)
//!                   │
//!             acquire lease ── won ──► invoke, write back, release (Computed)
//!                   │
//!                  lost ─► poll entry ── found ──► AwaitedHolder
//!                                    └── none ───► T::default() (LeaseTimeoutDefault)
//! ```
//!
//! Arguments without a key (see [`KeyError`](crate::key::KeyError)) skip the
//! cache entirely and report `Bypassed`. A held lease lives in a
//! [`LeaseGuard`], so it is released even when the caller's future is
//! dropped mid-computation.
//!
//! Store failures before the callable runs are contained when the policy is
//! high-availability: the callable runs directly (Fallback). Otherwise they
//! are converted into the callable's error type. Write-back, eviction and
//! lease-release failures are always logged and dropped. Errors from the
//! callable itself always propagate unchanged and are never cached.

use super::{CacheSource, CacheStats};
use crate::codec::{CodecError, JsonCodec, ValueCodec};
use crate::config::CacheableConfig;
use crate::error::{CacheableError, Result};
use crate::key::{CallableId, KeyArgs, KeyGenerator};
use crate::lock::{LeaseGuard, LockCoordinator, WaitOutcome};
use crate::policy::{CachePolicy, PolicyRegistry};
use crate::store::CacheStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CachingCore<S, C = JsonCodec> {
    store: Arc<S>,
    codec: C,
    coordinator: LockCoordinator,
    policies: PolicyRegistry,
    stats: CacheStats,
}

impl<S: CacheStore + 'static> CachingCore<S, JsonCodec> {
    pub fn new(store: S, coordinator: LockCoordinator) -> Self {
        Self::with_codec(store, JsonCodec, coordinator)
    }

    /// Build a core whose lease, wait schedule and policies come from configuration
    pub fn from_config(store: S, config: &CacheableConfig) -> Self {
        let coordinator = LockCoordinator::new(
            config.lease.to_lease_settings(),
            config.wait.to_wait_schedule(),
        );
        let core = Self::new(store, coordinator)
            .with_policies(PolicyRegistry::from_config(&config.policies));

        info!(
            store = core.store.provider_name(),
            policies = core.policies.len(),
            lease_ttl_seconds = config.lease.ttl_seconds,
            wait_attempts = config.wait.attempts,
            "Caching core initialized"
        );
        core
    }
}

impl<S: CacheStore + 'static, C: ValueCodec> CachingCore<S, C> {
    pub fn with_codec(store: S, codec: C, coordinator: LockCoordinator) -> Self {
        Self {
            store: Arc::new(store),
            codec,
            coordinator,
            policies: PolicyRegistry::new(),
            stats: CacheStats::new(),
        }
    }

    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub fn policies(&self) -> &PolicyRegistry {
        &self.policies
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn store(&self) -> &S {
        self.store.as_ref()
    }

    pub fn coordinator(&self) -> &LockCoordinator {
        &self.coordinator
    }

    /// Call `f(args)` through the cache using the registered policy of `id`
    ///
    /// Without a registered policy the callable runs directly.
    pub async fn call<A, T, E, F, Fut>(
        &self,
        id: &CallableId,
        args: A,
        f: F,
    ) -> std::result::Result<T, E>
    where
        A: KeyArgs,
        T: Serialize + DeserializeOwned + Default,
        E: From<CacheableError>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.call_traced(id, args, f).await.map(|(value, _)| value)
    }

    /// Like [`call`](Self::call), also reporting where the value came from
    pub async fn call_traced<A, T, E, F, Fut>(
        &self,
        id: &CallableId,
        args: A,
        f: F,
    ) -> std::result::Result<(T, CacheSource), E>
    where
        A: KeyArgs,
        T: Serialize + DeserializeOwned + Default,
        E: From<CacheableError>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match self.policies.resolve(id) {
            Some(policy) => self.execute(&policy, id, args, f).await,
            None => {
                debug!(callable = %id, "No cache policy, invoking directly");
                let value = f(args).await?;
                self.stats.record_source(CacheSource::Bypassed);
                Ok((value, CacheSource::Bypassed))
            }
        }
    }

    /// Call `f(args)` through the cache under an explicit policy
    pub async fn call_with_policy<A, T, E, F, Fut>(
        &self,
        policy: &CachePolicy,
        id: &CallableId,
        args: A,
        f: F,
    ) -> std::result::Result<(T, CacheSource), E>
    where
        A: KeyArgs,
        T: Serialize + DeserializeOwned + Default,
        E: From<CacheableError>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.execute(policy, id, args, f).await
    }

    async fn execute<A, T, E, F, Fut>(
        &self,
        policy: &CachePolicy,
        id: &CallableId,
        args: A,
        f: F,
    ) -> std::result::Result<(T, CacheSource), E>
    where
        A: KeyArgs,
        T: Serialize + DeserializeOwned + Default,
        E: From<CacheableError>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let key = match KeyGenerator::cache_key(policy.key_prefix(), id, &args) {
            Ok(key) => key,
            Err(e) => {
                warn!(callable = %id, error = %e, "Arguments have no cache key, invoking directly");
                let value = f(args).await?;
                self.stats.record_source(CacheSource::Bypassed);
                return Ok((value, CacheSource::Bypassed));
            }
        };

        match self.lookup::<T>(&key).await {
            Ok(Some(value)) => {
                debug!(key = %key, "Cache hit");
                self.stats.record_source(CacheSource::Hit);
                return Ok((value, CacheSource::Hit));
            }
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.stats.record_miss();
            }
            Err(e) => return self.contain(policy, &key, e, args, f).await,
        }

        if !policy.single_flight() {
            let value = f(args).await?;
            self.write_back(&key, &value, policy).await;
            self.stats.record_source(CacheSource::Computed);
            return Ok((value, CacheSource::Computed));
        }

        let lock_key = KeyGenerator::lock_key(&key);
        let lease = match self.coordinator.try_acquire(self.store.as_ref(), &lock_key).await {
            Ok(lease) => lease,
            Err(e) => return self.contain(policy, &key, e.into(), args, f).await,
        };

        if let Some(lease) = lease {
            let guard = LeaseGuard::new(Arc::clone(&self.store), lease);
            let result = f(args).await;
            if let Ok(value) = &result {
                self.write_back(&key, value, policy).await;
            }
            guard.release().await;

            let value = result?;
            self.stats.record_source(CacheSource::Computed);
            return Ok((value, CacheSource::Computed));
        }

        self.stats.record_contention_wait();
        match self.coordinator.wait_for_entry(self.store.as_ref(), &key).await {
            Ok(WaitOutcome::Found(raw)) => match self.codec.decode::<T>(&raw) {
                Ok(value) => {
                    self.stats.record_source(CacheSource::AwaitedHolder);
                    Ok((value, CacheSource::AwaitedHolder))
                }
                Err(e) => {
                    self.evict_corrupt(&key, &e).await;
                    let value = f(args).await?;
                    self.stats.record_source(CacheSource::Fallback);
                    Ok((value, CacheSource::Fallback))
                }
            },
            Ok(WaitOutcome::Exhausted) => {
                warn!(
                    key = %key,
                    waited_ms = self.coordinator.schedule().total_budget().as_millis() as u64,
                    "Lease holder did not publish in time, returning default"
                );
                self.stats.record_source(CacheSource::LeaseTimeoutDefault);
                Ok((T::default(), CacheSource::LeaseTimeoutDefault))
            }
            Err(e) => self.contain(policy, &key, e.into(), args, f).await,
        }
    }

    /// Read and decode the entry at `key`
    ///
    /// Corrupt entries are evicted and reported as a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = match self.store.get(key).await? {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };

        match self.codec.decode(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.evict_corrupt(key, &e).await;
                Ok(None)
            }
        }
    }

    async fn evict_corrupt(&self, key: &str, error: &CodecError) {
        self.stats.record_corrupt_entry();
        warn!(key = key, error = %error, "Evicting corrupt cache entry");
        if let Err(e) = self.store.delete(key).await {
            warn!(key = key, error = %e, "Failed to evict corrupt cache entry");
        }
    }

    async fn write_back<T: Serialize>(&self, key: &str, value: &T, policy: &CachePolicy) {
        let encoded = match self.codec.encode(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.stats.record_write_failure();
                warn!(key = key, error = %e, "Failed to encode result, not caching");
                return;
            }
        };

        match self.store.set(key, &encoded, policy.ttl()).await {
            Ok(()) => debug!(key = key, ttl_seconds = policy.ttl_seconds(), "Cache set"),
            Err(e) => {
                self.stats.record_write_failure();
                warn!(key = key, error = %e, "Failed to write cache entry");
            }
        }
    }

    /// Handle a store failure that happened before the callable ran
    async fn contain<A, T, E, F, Fut>(
        &self,
        policy: &CachePolicy,
        key: &str,
        error: CacheableError,
        args: A,
        f: F,
    ) -> std::result::Result<(T, CacheSource), E>
    where
        E: From<CacheableError>,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if !policy.high_availability() {
            warn!(key = key, error = %error, "Cache store failed, surfacing error");
            return Err(E::from(error));
        }

        warn!(key = key, error = %error, "Cache store failed, invoking directly");
        let value = f(args).await?;
        self.stats.record_source(CacheSource::Fallback);
        Ok((value, CacheSource::Fallback))
    }

    /// Remove the cached entry for one argument list
    pub async fn invalidate<A: KeyArgs + ?Sized>(
        &self,
        policy: &CachePolicy,
        id: &CallableId,
        args: &A,
    ) -> Result<()> {
        let key = KeyGenerator::cache_key(policy.key_prefix(), id, args)?;
        self.store.delete(&key).await?;
        debug!(key = %key, "Cache entry invalidated");
        Ok(())
    }

    /// Remove every cached entry of a callable
    ///
    /// Returns the number of argument-bearing entries removed by the pattern
    /// delete; the argument-less entry is removed separately.
    pub async fn invalidate_all(&self, policy: &CachePolicy, id: &CallableId) -> Result<u64> {
        let namespace = KeyGenerator::key_namespace(policy.key_prefix(), id);
        let removed = self.store.delete_pattern(&format!("{namespace}_*")).await?;
        self.store.delete(&namespace).await?;
        info!(namespace = %namespace, removed = removed, "Cache namespace invalidated");
        Ok(removed)
    }
}
