//! Store provider with integrated circuit breaker
//!
//! Uses enum dispatch over the concrete backends. Circuit breaker protection
//! is an internal detail: consumers use `StoreProvider` and get fail-fast
//! behavior whenever a distributed backend keeps failing.

use super::errors::{StoreError, StoreResult};
use super::providers::NoOpStore;
use super::traits::CacheStore;
use crate::config::{CircuitBreakerSettings, StoreConfig};
use crate::resilience::{CircuitBreaker, CircuitState};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[cfg(feature = "store-redis")]
use super::providers::RedisStore;

#[cfg(feature = "store-moka")]
use super::providers::MemoryStore;

const CIRCUIT_COMPONENT: &str = "cache_store";

/// Internal backend enum for static dispatch
#[derive(Debug, Clone)]
enum StoreBackend {
    #[cfg(feature = "store-redis")]
    Redis(Box<RedisStore>),

    #[cfg(feature = "store-moka")]
    Moka(Box<MemoryStore>),

    NoOp(NoOpStore),
}

impl StoreBackend {
    fn is_distributed(&self) -> bool {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.is_distributed(),
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.is_distributed(),
            Self::NoOp(s) => s.is_distributed(),
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.provider_name(),
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.provider_name(),
            Self::NoOp(s) => s.provider_name(),
        }
    }

    fn is_enabled(&self) -> bool {
        !matches!(self, Self::NoOp(_))
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.get(key).await,
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.get(key).await,
            Self::NoOp(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.set(key, value, ttl).await,
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.set(key, value, ttl).await,
            Self::NoOp(s) => s.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.delete(key).await,
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.delete(key).await,
            Self::NoOp(s) => s.delete(key).await,
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> StoreResult<u64> {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.delete_pattern(pattern).await,
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.delete_pattern(pattern).await,
            Self::NoOp(s) => s.delete_pattern(pattern).await,
        }
    }

    async fn try_acquire_lease(
        &self,
        lock_key: &str,
        holder_token: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.try_acquire_lease(lock_key, holder_token, ttl).await,
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.try_acquire_lease(lock_key, holder_token, ttl).await,
            Self::NoOp(s) => s.try_acquire_lease(lock_key, holder_token, ttl).await,
        }
    }

    async fn release_lease(&self, lock_key: &str, holder_token: &str) -> StoreResult<()> {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.release_lease(lock_key, holder_token).await,
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.release_lease(lock_key, holder_token).await,
            Self::NoOp(s) => s.release_lease(lock_key, holder_token).await,
        }
    }

    async fn health_check(&self) -> StoreResult<bool> {
        match self {
            #[cfg(feature = "store-redis")]
            Self::Redis(s) => s.health_check().await,
            #[cfg(feature = "store-moka")]
            Self::Moka(s) => s.health_check().await,
            Self::NoOp(s) => s.health_check().await,
        }
    }
}

/// Store provider with integrated circuit breaker protection
///
/// ## Backends
///
/// - **Redis/Dragonfly**: shared entries and leases across processes
/// - **Moka**: in-process store for single-instance deployments and tests
/// - **NoOp**: always-miss fallback when caching is disabled
///
/// ## Circuit Breaker
///
/// For distributed backends a circuit breaker stops repeated timeout
/// penalties while the backend is down. When open, every operation returns
/// [`StoreError::CircuitOpen`] without touching the network, and the caching
/// core treats that like any other store failure.
#[derive(Clone)]
pub struct StoreProvider {
    backend: StoreBackend,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl std::fmt::Debug for StoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreProvider")
            .field("backend", &self.backend)
            .field(
                "circuit_breaker",
                &self.circuit_breaker.as_ref().map(|cb| cb.state()),
            )
            .finish()
    }
}

impl StoreProvider {
    /// Create a store provider from configuration with graceful degradation
    ///
    /// A backend that cannot be created is logged and replaced by NoOp. The
    /// application never fails to start because of the cache.
    pub async fn from_config_graceful(
        config: &StoreConfig,
        cb_settings: Option<&CircuitBreakerSettings>,
    ) -> Self {
        let backend = Self::create_backend(config).await;

        // Only distributed, enabled backends get a breaker
        let circuit_breaker = if backend.is_distributed() && backend.is_enabled() {
            cb_settings
                .filter(|settings| settings.enabled)
                .map(|settings| {
                    info!(
                        failure_threshold = settings.failure_threshold,
                        timeout_seconds = settings.timeout_seconds,
                        "Store circuit breaker initialized"
                    );
                    Arc::new(CircuitBreaker::new(
                        CIRCUIT_COMPONENT.to_string(),
                        settings.to_resilience_config(),
                    ))
                })
        } else {
            None
        };

        Self {
            backend,
            circuit_breaker,
        }
    }

    async fn create_backend(config: &StoreConfig) -> StoreBackend {
        if !config.enabled {
            info!("Cache store disabled by configuration");
            return StoreBackend::NoOp(NoOpStore::new());
        }

        match config.backend.as_str() {
            // Dragonfly speaks the Redis protocol
            "redis" | "dragonfly" => Self::create_redis_backend(config).await,
            "moka" | "memory" | "in-memory" => Self::create_moka_backend(config),
            "noop" => StoreBackend::NoOp(NoOpStore::new()),
            other => {
                warn!(backend = other, "Unknown store backend, falling back to NoOp");
                StoreBackend::NoOp(NoOpStore::new())
            }
        }
    }

    #[cfg(feature = "store-redis")]
    async fn create_redis_backend(config: &StoreConfig) -> StoreBackend {
        let redis_config = match &config.redis {
            Some(rc) => rc,
            None => {
                warn!("Redis store selected but no [store.redis] config found, falling back to NoOp");
                return StoreBackend::NoOp(NoOpStore::new());
            }
        };

        match RedisStore::from_config(redis_config).await {
            Ok(store) => {
                info!(backend = "redis", "Distributed cache store initialized");
                StoreBackend::Redis(Box::new(store))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to connect to Redis, falling back to NoOp store (graceful degradation)"
                );
                StoreBackend::NoOp(NoOpStore::new())
            }
        }
    }

    #[cfg(not(feature = "store-redis"))]
    async fn create_redis_backend(_config: &StoreConfig) -> StoreBackend {
        warn!("Redis store requested but 'store-redis' feature not enabled, using NoOp");
        StoreBackend::NoOp(NoOpStore::new())
    }

    #[cfg(feature = "store-moka")]
    fn create_moka_backend(config: &StoreConfig) -> StoreBackend {
        let moka_config = config.moka.clone().unwrap_or_default();
        let store = MemoryStore::from_config(&moka_config);
        info!(
            backend = "moka",
            max_capacity = moka_config.max_capacity,
            "In-memory cache store initialized"
        );
        StoreBackend::Moka(Box::new(store))
    }

    #[cfg(not(feature = "store-moka"))]
    fn create_moka_backend(_config: &StoreConfig) -> StoreBackend {
        warn!("Moka store requested but 'store-moka' feature not enabled, using NoOp");
        StoreBackend::NoOp(NoOpStore::new())
    }

    /// Create a NoOp provider (for explicit opt-out or testing)
    pub fn noop() -> Self {
        Self {
            backend: StoreBackend::NoOp(NoOpStore::new()),
            circuit_breaker: None,
        }
    }

    /// Create an in-process provider
    #[cfg(feature = "store-moka")]
    pub fn memory(max_capacity: u64) -> Self {
        Self {
            backend: StoreBackend::Moka(Box::new(MemoryStore::new(max_capacity))),
            circuit_breaker: None,
        }
    }

    /// Check if caching is actually enabled (not NoOp)
    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    /// Current circuit breaker state, `None` when no breaker is configured
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuit_breaker.as_ref().map(|cb| cb.state())
    }

    /// Run one backend operation under the circuit breaker, if any
    async fn guarded<T, F, Fut>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let Some(cb) = self.circuit_breaker.as_ref() else {
            return call().await;
        };

        if !cb.should_allow() {
            debug!(operation = operation, "Store circuit open, failing fast");
            return Err(StoreError::CircuitOpen {
                component: cb.name().to_string(),
            });
        }

        let start = Instant::now();
        let result = call().await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => cb.record_success(duration),
            Err(_) => cb.record_failure(duration),
        }

        result
    }
}

impl CacheStore for StoreProvider {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.guarded("get", || self.backend.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.guarded("set", || self.backend.set(key, value, ttl))
            .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.guarded("delete", || self.backend.delete(key)).await
    }

    async fn delete_pattern(&self, pattern: &str) -> StoreResult<u64> {
        self.guarded("delete_pattern", || self.backend.delete_pattern(pattern))
            .await
    }

    async fn try_acquire_lease(
        &self,
        lock_key: &str,
        holder_token: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        self.guarded("try_acquire_lease", || {
            self.backend.try_acquire_lease(lock_key, holder_token, ttl)
        })
        .await
    }

    async fn release_lease(&self, lock_key: &str, holder_token: &str) -> StoreResult<()> {
        self.guarded("release_lease", || {
            self.backend.release_lease(lock_key, holder_token)
        })
        .await
    }

    /// Reports unhealthy while the circuit is open
    async fn health_check(&self) -> StoreResult<bool> {
        match self.guarded("health_check", || self.backend.health_check()).await {
            Err(StoreError::CircuitOpen { .. }) => Ok(false),
            other => other,
        }
    }

    fn provider_name(&self) -> &'static str {
        self.backend.provider_name()
    }

    fn is_distributed(&self) -> bool {
        self.backend.is_distributed()
    }
}
