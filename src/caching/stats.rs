//! # Caching Statistics
//!
//! Atomic counters recorded on the call path with `Relaxed` ordering, read
//! through `snapshot()`.

use super::CacheSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    contention_waits: AtomicU64,
    awaited_hits: AtomicU64,
    defaults_served: AtomicU64,
    corrupt_entries: AtomicU64,
    fallbacks: AtomicU64,
    bypassed: AtomicU64,
    write_failures: AtomicU64,
    invocations: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count how a call was answered
    #[inline]
    pub fn record_source(&self, source: CacheSource) {
        let counter = match source {
            CacheSource::Hit => &self.hits,
            CacheSource::Computed => &self.computations,
            CacheSource::AwaitedHolder => &self.awaited_hits,
            CacheSource::LeaseTimeoutDefault => &self.defaults_served,
            CacheSource::Bypassed => &self.bypassed,
            CacheSource::Fallback => &self.fallbacks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if source.invoked_callable() {
            self.invocations.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_contention_wait(&self) {
        self.contention_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_corrupt_entry(&self) {
        self.corrupt_entries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            contention_waits: self.contention_waits.load(Ordering::Relaxed),
            awaited_hits: self.awaited_hits.load(Ordering::Relaxed),
            defaults_served: self.defaults_served.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            captured_at: Utc::now(),
        }
    }
}

/// Point-in-time view of [`CacheStats`]
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub contention_waits: u64,
    pub awaited_hits: u64,
    pub defaults_served: u64,
    pub corrupt_entries: u64,
    pub fallbacks: u64,
    pub bypassed: u64,
    pub write_failures: u64,
    /// Calls that ran the callable, whatever the reason
    pub invocations: u64,
    pub captured_at: DateTime<Utc>,
}

impl CacheStatsSnapshot {
    /// Hits (direct or after waiting) over all cached lookups
    pub fn hit_ratio(&self) -> f64 {
        let served_from_cache = self.hits + self.awaited_hits;
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            served_from_cache as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_land_in_their_counters() {
        let stats = CacheStats::new();
        stats.record_source(CacheSource::Hit);
        stats.record_source(CacheSource::Hit);
        stats.record_source(CacheSource::Computed);
        stats.record_source(CacheSource::LeaseTimeoutDefault);
        stats.record_miss();

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.computations, 1);
        assert_eq!(snap.defaults_served, 1);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.fallbacks, 0);
        assert_eq!(snap.invocations, 1);
    }

    #[test]
    fn test_invocations_count_every_source_that_ran_the_callable() {
        let stats = CacheStats::new();
        for source in [
            CacheSource::Hit,
            CacheSource::Computed,
            CacheSource::AwaitedHolder,
            CacheSource::LeaseTimeoutDefault,
            CacheSource::Bypassed,
            CacheSource::Fallback,
        ] {
            stats.record_source(source);
        }

        assert_eq!(stats.snapshot().invocations, 3);
    }

    #[test]
    fn test_hit_ratio() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_ratio(), 0.0);

        stats.record_source(CacheSource::Hit);
        stats.record_miss();
        assert!((stats.snapshot().hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(CacheStats::new().snapshot()).unwrap();
        assert_eq!(json["hits"], 0);
        assert!(json["captured_at"].is_string());
    }
}
