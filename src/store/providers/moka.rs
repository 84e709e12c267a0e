//! In-memory store provider using Moka
//!
//! Provides in-process caching with per-entry TTLs for single-instance
//! deployments and tests.
//!
//! **Important**: This store is NOT distributed. Each process keeps its own
//! entries and leases, so single-flight only holds within one process.

use crate::config::MokaConfig;
use crate::store::errors::StoreResult;
use crate::store::traits::CacheStore;
use moka::future::Cache;
use moka::ops::compute::Op;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::debug;

/// A stored value together with the TTL it was written with
#[derive(Debug, Clone)]
struct Expiring {
    value: String,
    ttl: Duration,
}

/// Expires every entry after the TTL it carries
struct PerEntryTtl;

impl Expiry<String, Expiring> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Expiring,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Expiring,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory store backed by two Moka caches, one for entries and one for
/// leases, so pattern deletes never touch an in-flight lease.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, Expiring>,
    leases: Cache<String, Expiring>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("max_capacity", &self.entries.policy().max_capacity())
            .field("entry_count", &self.entries.entry_count())
            .field("lease_count", &self.leases.entry_count())
            .finish()
    }
}

impl MemoryStore {
    /// Create a new in-memory store from configuration
    pub fn from_config(config: &MokaConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        let leases = Cache::builder().expire_after(PerEntryTtl).build();

        debug!(
            max_capacity = config.max_capacity,
            "Moka in-memory store created"
        );

        Self { entries, leases }
    }

    pub fn new(max_capacity: u64) -> Self {
        Self::from_config(&MokaConfig { max_capacity })
    }
}

impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let result = self.entries.get(key).await.map(|e| e.value);

        if result.is_some() {
            debug!(key = key, "Cache HIT (moka)");
        } else {
            debug!(key = key, "Cache MISS (moka)");
        }

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.entries
            .insert(
                key.to_string(),
                Expiring {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;

        debug!(key = key, ttl_seconds = ttl.as_secs(), "Cache SET (moka)");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.invalidate(key).await;
        debug!(key = key, "Cache DEL (moka)");
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> StoreResult<u64> {
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| glob_matches(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &matching {
            self.entries.invalidate(key).await;
        }

        debug!(
            pattern = pattern,
            deleted = matching.len(),
            "Cache pattern DEL (moka)"
        );
        Ok(matching.len() as u64)
    }

    async fn try_acquire_lease(
        &self,
        lock_key: &str,
        holder_token: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let lease = Expiring {
            value: holder_token.to_string(),
            ttl,
        };
        let entry = self
            .leases
            .entry(lock_key.to_string())
            .or_insert_with(async move { lease })
            .await;

        let acquired = entry.is_fresh();
        debug!(
            lock_key = lock_key,
            acquired = acquired,
            "Lease acquire (moka)"
        );
        Ok(acquired)
    }

    async fn release_lease(&self, lock_key: &str, holder_token: &str) -> StoreResult<()> {
        self.leases
            .entry(lock_key.to_string())
            .and_compute_with(|current| {
                let op = match current {
                    Some(lease) if lease.value().value == holder_token => Op::Remove,
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        debug!(lock_key = lock_key, "Lease release (moka)");
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "moka"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}

/// Redis-style glob match supporting `*` and `?`
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, c));
            p += 1;
        } else if let Some((star_p, star_c)) = backtrack {
            p = star_p + 1;
            c = star_c + 1;
            backtrack = Some((star_p, star_c + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&ch| ch == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_moka_set_and_get() {
        let store = MemoryStore::new(100);
        let value = r#"{"id":7,"time":"2024-01-01T00:00:00Z"}"#;

        store
            .set("test_DemoService_get_time", value, Duration::from_secs(60))
            .await
            .unwrap();

        let result = store.get("test_DemoService_get_time").await.unwrap();
        assert_eq!(result.as_deref(), Some(value));
    }

    #[tokio::test]
    async fn test_moka_per_entry_ttl_expiry() {
        let store = MemoryStore::new(100);

        store
            .set("short", "v", Duration::from_millis(50))
            .await
            .unwrap();
        store
            .set("long", "v", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        store.entries.run_pending_tasks().await;

        assert!(store.get("short").await.unwrap().is_none());
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_moka_delete() {
        let store = MemoryStore::new(100);
        store
            .set("to_delete", "value", Duration::from_secs(60))
            .await
            .unwrap();

        store.delete("to_delete").await.unwrap();
        assert!(store.get("to_delete").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_moka_delete_pattern_only_touches_matches() {
        let store = MemoryStore::new(100);
        let ttl = Duration::from_secs(60);
        store.set("p_Svc_op_1", "a", ttl).await.unwrap();
        store.set("p_Svc_op_2", "b", ttl).await.unwrap();
        store.set("p_Svc_other_1", "c", ttl).await.unwrap();
        store.entries.run_pending_tasks().await;

        let deleted = store.delete_pattern("p_Svc_op_*").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.get("p_Svc_op_1").await.unwrap().is_none());
        assert!(store.get("p_Svc_other_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_moka_lease_is_exclusive() {
        let store = MemoryStore::new(100);
        let ttl = Duration::from_secs(10);

        assert!(store.try_acquire_lease("Lock_k", "holder-a", ttl).await.unwrap());
        assert!(!store.try_acquire_lease("Lock_k", "holder-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_moka_release_ignores_foreign_token() {
        let store = MemoryStore::new(100);
        let ttl = Duration::from_secs(10);

        assert!(store.try_acquire_lease("Lock_k", "holder-a", ttl).await.unwrap());
        store.release_lease("Lock_k", "holder-b").await.unwrap();
        assert!(!store.try_acquire_lease("Lock_k", "holder-c", ttl).await.unwrap());

        store.release_lease("Lock_k", "holder-a").await.unwrap();
        assert!(store.try_acquire_lease("Lock_k", "holder-c", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_moka_lease_expires() {
        let store = MemoryStore::new(100);

        assert!(store
            .try_acquire_lease("Lock_k", "crashed", Duration::from_millis(50))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(120)).await;
        store.leases.run_pending_tasks().await;

        assert!(store
            .try_acquire_lease("Lock_k", "next", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_moka_is_not_distributed() {
        let store = MemoryStore::new(10);
        assert_eq!(store.provider_name(), "moka");
        assert!(!store.is_distributed());
        assert!(format!("{store:?}").contains("MemoryStore"));
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("a_*", "a_b_c"));
        assert!(glob_matches("a_?_c", "a_b_c"));
        assert!(glob_matches("*", ""));
        assert!(!glob_matches("a_*", "b_a"));
        assert!(!glob_matches("a_?", "a_bc"));
        assert!(glob_matches("*_op_*", "p_Svc_op_1"));
    }
}
