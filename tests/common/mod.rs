//! Shared fixtures for integration tests.
//!
//! [`FaultyStore`] is an in-memory [`CacheStore`] whose operations can be
//! switched to fail, and which counts every call so tests can assert on
//! store traffic as well as results.

#![allow(dead_code)]

use cacheable::error::CacheableError;
use cacheable::lock::{LeaseSettings, LockCoordinator, WaitSchedule};
use cacheable::store::{CacheStore, StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Error type of the callables under test
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheableError),

    #[error("upstream failed: {0}")]
    Upstream(String),
}

/// Coordinator with a short schedule: 20, 30, 40 ms (90 ms budget)
pub fn fast_coordinator() -> LockCoordinator {
    LockCoordinator::new(
        LeaseSettings::new(Duration::from_secs(5), "integration"),
        WaitSchedule::linear(3, Duration::from_millis(20), Duration::from_millis(10)),
    )
}

#[derive(Debug)]
struct Stored {
    value: String,
    ttl: Duration,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Faults {
    reads: AtomicBool,
    writes: AtomicBool,
    deletes: AtomicBool,
    leases: AtomicBool,
}

/// Per-operation call counts
#[derive(Debug, Default)]
pub struct Counters {
    pub gets: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
    pub acquires: AtomicU64,
    pub releases: AtomicU64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<String, Stored>>,
    leases: Mutex<HashMap<String, (String, Instant)>>,
    faults: Faults,
    counters: Counters,
}

#[derive(Debug, Clone, Default)]
pub struct FaultyStore {
    inner: Arc<Inner>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &Counters {
        &self.inner.counters
    }

    pub fn count(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.faults.reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.faults.writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.inner.faults.deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_leases(&self, fail: bool) {
        self.inner.faults.leases.store(fail, Ordering::SeqCst);
    }

    pub fn fail_everything(&self) {
        self.fail_reads(true);
        self.fail_writes(true);
        self.fail_deletes(true);
        self.fail_leases(true);
    }

    /// Write an entry directly, bypassing fault injection and counters
    pub fn put_raw(&self, key: &str, value: &str) {
        let ttl = Duration::from_secs(300);
        self.inner.entries.lock().insert(
            key.to_string(),
            Stored {
                value: value.to_string(),
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.live_entry(key).map(|(value, _)| value)
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.live_entry(key).map(|(_, ttl)| ttl)
    }

    /// Simulate another process holding the lease and never releasing it
    pub fn hold_lease_forever(&self, lock_key: &str) {
        self.inner.leases.lock().insert(
            lock_key.to_string(),
            (
                "crashed-holder".to_string(),
                Instant::now() + Duration::from_secs(3600),
            ),
        );
    }

    pub fn lease_holder(&self, lock_key: &str) -> Option<String> {
        let leases = self.inner.leases.lock();
        leases
            .get(lock_key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(token, _)| token.clone())
    }

    fn live_entry(&self, key: &str) -> Option<(String, Duration)> {
        let entries = self.inner.entries.lock();
        entries
            .get(key)
            .filter(|stored| stored.expires_at > Instant::now())
            .map(|stored| (stored.value.clone(), stored.ttl))
    }

    fn check(flag: &AtomicBool, operation: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::ConnectionError(format!(
                "injected {operation} failure"
            )))
        } else {
            Ok(())
        }
    }
}

impl CacheStore for FaultyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.counters.gets.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.inner.faults.reads, "get")?;
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.inner.counters.sets.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.inner.faults.writes, "set")?;
        self.inner.entries.lock().insert(
            key.to_string(),
            Stored {
                value: value.to_string(),
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.counters.deletes.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.inner.faults.deletes, "delete")?;
        self.inner.entries.lock().remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> StoreResult<u64> {
        Self::check(&self.inner.faults.deletes, "delete_pattern")?;
        // Only trailing-star patterns are needed here
        let prefix = pattern.trim_end_matches('*');
        let mut entries = self.inner.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn try_acquire_lease(
        &self,
        lock_key: &str,
        holder_token: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        self.inner.counters.acquires.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.inner.faults.leases, "try_acquire_lease")?;

        let now = Instant::now();
        let mut leases = self.inner.leases.lock();
        match leases.get(lock_key) {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                leases.insert(lock_key.to_string(), (holder_token.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release_lease(&self, lock_key: &str, holder_token: &str) -> StoreResult<()> {
        self.inner.counters.releases.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.inner.faults.leases, "release_lease")?;

        let mut leases = self.inner.leases.lock();
        if leases
            .get(lock_key)
            .is_some_and(|(token, _)| token == holder_token)
        {
            leases.remove(lock_key);
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(!self.inner.faults.reads.load(Ordering::SeqCst))
    }

    fn provider_name(&self) -> &'static str {
        "faulty"
    }

    fn is_distributed(&self) -> bool {
        true
    }
}
