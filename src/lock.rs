//! # Single-Flight Lock Coordination
//!
//! On a miss under a single-flight policy, callers race for a lease stored
//! under `Lock_{cache_key}`. The winner computes and writes the entry. The
//! others poll the *entry* (not the lease) on a bounded, increasing schedule
//! and give up with the default value once the schedule runs out.
//!
//! A lease carries a TTL so a crashed holder blocks its key for at most that
//! long, and a token unique to each acquisition so a holder whose lease has
//! expired can never release the lease of the next holder.

use crate::store::{CacheStore, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lease lifetime and holder identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSettings {
    ttl: Duration,
    holder_id: String,
}

impl LeaseSettings {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

    pub fn new(ttl: Duration, holder_id: impl Into<String>) -> Self {
        Self {
            ttl,
            holder_id: holder_id.into(),
        }
    }

    /// `{HOSTNAME}-{pid}`, or `localhost-{pid}` when HOSTNAME is unset
    pub fn default_holder_id() -> String {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        format!("{}-{}", host, std::process::id())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL, Self::default_holder_id())
    }
}

/// Poll schedule for callers that lost the lease race
///
/// Attempt `i` (zero-based) waits `initial + i * step`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSchedule {
    attempts: u32,
    initial: Duration,
    step: Duration,
}

impl WaitSchedule {
    /// Longest total wait a contender may be configured for
    pub const MAX_TOTAL_BUDGET: Duration = Duration::from_secs(300);

    pub fn linear(attempts: u32, initial: Duration, step: Duration) -> Self {
        Self {
            attempts,
            initial,
            step,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Saturates at `Duration::MAX` instead of overflowing
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts).map(move |i| {
            self.step
                .checked_mul(i)
                .and_then(|offset| self.initial.checked_add(offset))
                .unwrap_or(Duration::MAX)
        })
    }

    /// Sum of every delay; the longest a contender waits before defaulting
    ///
    /// `attempts * initial + step * attempts * (attempts - 1) / 2`, saturating.
    pub fn total_budget(&self) -> Duration {
        let n = u128::from(self.attempts);
        let nanos = self
            .initial
            .as_nanos()
            .saturating_mul(n)
            .saturating_add(self.step.as_nanos().saturating_mul(n * n.saturating_sub(1) / 2));
        u64::try_from(nanos)
            .map(Duration::from_nanos)
            .unwrap_or(Duration::MAX)
    }

    /// Delays must be non-zero, strictly increasing and fit in
    /// [`MAX_TOTAL_BUDGET`](Self::MAX_TOTAL_BUDGET)
    pub fn validate(&self) -> Result<(), String> {
        if self.attempts > 0 && self.initial.is_zero() {
            return Err("initial wait delay must be greater than 0".to_string());
        }
        if self.attempts > 1 && self.step.is_zero() {
            return Err("wait delay step must be greater than 0".to_string());
        }
        if self.total_budget() > Self::MAX_TOTAL_BUDGET {
            return Err(format!(
                "total wait must not exceed {}s",
                Self::MAX_TOTAL_BUDGET.as_secs()
            ));
        }
        Ok(())
    }
}

impl Default for WaitSchedule {
    fn default() -> Self {
        Self::linear(5, Duration::from_millis(500), Duration::from_millis(100))
    }
}

/// A held lease; hand it back to [`LockCoordinator::release`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    lock_key: String,
    holder_token: String,
    ttl: Duration,
}

impl Lease {
    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    pub fn holder_token(&self) -> &str {
        &self.holder_token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Outcome of waiting on another caller's computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The holder's entry appeared
    Found(String),
    /// Every attempt missed
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct LockCoordinator {
    lease: LeaseSettings,
    schedule: WaitSchedule,
}

impl LockCoordinator {
    pub fn new(lease: LeaseSettings, schedule: WaitSchedule) -> Self {
        Self { lease, schedule }
    }

    pub fn lease_settings(&self) -> &LeaseSettings {
        &self.lease
    }

    pub fn schedule(&self) -> &WaitSchedule {
        &self.schedule
    }

    /// Try to become the single computing caller for `lock_key`
    ///
    /// `Ok(None)` means another caller holds the lease.
    pub async fn try_acquire<S: CacheStore>(
        &self,
        store: &S,
        lock_key: &str,
    ) -> StoreResult<Option<Lease>> {
        let holder_token = format!("{}:{}", self.lease.holder_id(), Uuid::new_v4());
        let acquired = store
            .try_acquire_lease(lock_key, &holder_token, self.lease.ttl())
            .await?;

        if !acquired {
            debug!(lock_key = lock_key, "Lease held elsewhere");
            return Ok(None);
        }

        debug!(
            lock_key = lock_key,
            holder_token = %holder_token,
            ttl_ms = self.lease.ttl().as_millis() as u64,
            "Lease acquired"
        );
        Ok(Some(Lease {
            lock_key: lock_key.to_string(),
            holder_token,
            ttl: self.lease.ttl(),
        }))
    }

    /// Release a lease, best effort
    ///
    /// Failures are logged and dropped; the lease TTL reclaims it.
    pub async fn release<S: CacheStore>(&self, store: &S, lease: Lease) {
        release_quietly(store, &lease).await;
    }

    /// Poll `key` until a non-empty entry appears or the schedule runs out
    pub async fn wait_for_entry<S: CacheStore>(
        &self,
        store: &S,
        key: &str,
    ) -> StoreResult<WaitOutcome> {
        for (attempt, delay) in self.schedule.delays().enumerate() {
            tokio::time::sleep(delay).await;

            match store.get(key).await? {
                Some(raw) if !raw.is_empty() => {
                    debug!(key = key, attempt = attempt, "Entry appeared while waiting");
                    return Ok(WaitOutcome::Found(raw));
                }
                _ => debug!(
                    key = key,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Entry not ready"
                ),
            }
        }

        debug!(
            key = key,
            attempts = self.schedule.attempts(),
            "Wait schedule exhausted"
        );
        Ok(WaitOutcome::Exhausted)
    }
}

async fn release_quietly<S: CacheStore>(store: &S, lease: &Lease) {
    match store
        .release_lease(&lease.lock_key, &lease.holder_token)
        .await
    {
        Ok(()) => debug!(lock_key = %lease.lock_key, "Lease released"),
        Err(e) => warn!(
            lock_key = %lease.lock_key,
            error = %e,
            "Failed to release lease, leaving it to expire"
        ),
    }
}

/// Owns a held lease until it is released
///
/// Call [`release`](Self::release) on the normal path. If the guard is dropped
/// instead (the caller's future was cancelled, or the callable panicked), the
/// release is spawned onto the current runtime so contenders are not left
/// waiting out the lease TTL.
pub struct LeaseGuard<S: CacheStore + 'static> {
    store: Arc<S>,
    lease: Option<Lease>,
}

impl<S: CacheStore + 'static> LeaseGuard<S> {
    pub fn new(store: Arc<S>, lease: Lease) -> Self {
        Self {
            store,
            lease: Some(lease),
        }
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    pub async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            release_quietly(self.store.as_ref(), &lease).await;
        }
    }
}

impl<S: CacheStore + 'static> std::fmt::Debug for LeaseGuard<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("lease", &self.lease)
            .finish()
    }
}

impl<S: CacheStore + 'static> Drop for LeaseGuard<S> {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(lock_key = %lease.lock_key, "Lease guard dropped, releasing in background");
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    release_quietly(store.as_ref(), &lease).await;
                });
            }
            Err(_) => warn!(
                lock_key = %lease.lock_key,
                "Lease guard dropped outside a runtime, leaving lease to expire"
            ),
        }
    }
}
