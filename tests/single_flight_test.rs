//! Single-flight coordination between concurrent callers

mod common;

use cacheable::{CachePolicy, CacheSource, CachingCore, CallableId};
use common::{fast_coordinator, AppError, FaultyStore};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Report {
    rows: Vec<u32>,
    generated_by: u64,
}

fn single_flight_policy() -> CachePolicy {
    CachePolicy::builder()
        .ttl_seconds(60)
        .key_prefix("sf")
        .single_flight(true)
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_compute_once() {
    let store = FaultyStore::new();
    let core = CachingCore::new(store.clone(), fast_coordinator());
    let id = CallableId::new("Reports", "monthly");
    let policy = single_flight_policy();
    let invocations = AtomicU64::new(0);

    let calls = (0..8).map(|_| {
        core.call_with_policy(&policy, &id, ("2024-05",), |_| {
            let n = invocations.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, AppError>(Report {
                    rows: vec![1, 2, 3],
                    generated_by: n,
                })
            }
        })
    });
    let results = join_all(calls).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let mut computed = 0;
    for result in results {
        let (report, source) = result.unwrap();
        assert_eq!(report.generated_by, 1);
        assert_eq!(report.rows, vec![1, 2, 3]);
        match source {
            CacheSource::Computed => computed += 1,
            CacheSource::AwaitedHolder => {}
            other => panic!("unexpected source {other}"),
        }
    }
    assert_eq!(computed, 1);
    assert_eq!(core.stats().snapshot().contention_waits, 7);
}

#[tokio::test]
async fn test_contender_returns_default_when_holder_never_publishes() {
    let store = FaultyStore::new();
    store.hold_lease_forever("Lock_sf_Reports_monthly_2024-06");
    let core = CachingCore::new(store.clone(), fast_coordinator());
    let id = CallableId::new("Reports", "monthly");
    let invocations = AtomicU64::new(0);

    let started = std::time::Instant::now();
    let (report, source) = core
        .call_with_policy(&single_flight_policy(), &id, ("2024-06",), |_| {
            invocations.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, AppError>(Report { rows: vec![9], generated_by: 1 }) }
        })
        .await
        .unwrap();

    assert_eq!(report, Report::default());
    assert_eq!(source, CacheSource::LeaseTimeoutDefault);
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    // Initial lookup plus one poll per scheduled attempt
    assert_eq!(FaultyStore::count(&store.counters().gets), 4);
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert_eq!(core.stats().snapshot().defaults_served, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_holder_serves_contender_default_then_later_callers_hit() {
    let store = FaultyStore::new();
    let core = CachingCore::new(store.clone(), fast_coordinator());
    let id = CallableId::new("Reports", "yearly");
    let policy = single_flight_policy();

    let holder = core.call_with_policy(&policy, &id, (2024_u32,), |_| async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok::<_, AppError>(Report {
            rows: vec![2024],
            generated_by: 1,
        })
    });
    let contender = async {
        // Let the holder take the lease first
        tokio::time::sleep(Duration::from_millis(10)).await;
        core.call_with_policy(&policy, &id, (2024_u32,), |_| async {
            Ok::<_, AppError>(Report {
                rows: vec![0],
                generated_by: 2,
            })
        })
        .await
    };

    let (holder_result, contender_result) = tokio::join!(holder, contender);

    let (held, held_source) = holder_result.unwrap();
    assert_eq!(held_source, CacheSource::Computed);
    assert_eq!(held.generated_by, 1);

    let (waited, waited_source) = contender_result.unwrap();
    assert_eq!(waited_source, CacheSource::LeaseTimeoutDefault);
    assert_eq!(waited, Report::default());

    let (later, later_source) = core
        .call_with_policy(&policy, &id, (2024_u32,), |_| async {
            Ok::<_, AppError>(Report::default())
        })
        .await
        .unwrap();
    assert_eq!(later_source, CacheSource::Hit);
    assert_eq!(later, held);
}

#[tokio::test]
async fn test_lease_is_released_after_holder_finishes() {
    let store = FaultyStore::new();
    let core = CachingCore::new(store.clone(), fast_coordinator());
    let id = CallableId::new("Reports", "daily");
    let policy = single_flight_policy();

    core.call_with_policy(&policy, &id, ("mon",), |_| async {
        Ok::<_, AppError>(Report::default())
    })
    .await
    .unwrap();

    assert_eq!(store.lease_holder("Lock_sf_Reports_daily_mon"), None);
    assert_eq!(FaultyStore::count(&store.counters().acquires), 1);
    assert_eq!(FaultyStore::count(&store.counters().releases), 1);
}

#[tokio::test]
async fn test_without_single_flight_no_lease_is_taken() {
    let store = FaultyStore::new();
    store.hold_lease_forever("Lock_plain_Reports_daily_tue");
    let core = CachingCore::new(store.clone(), fast_coordinator());
    let id = CallableId::new("Reports", "daily");
    let policy = CachePolicy::builder().key_prefix("plain").build();

    let (report, source) = core
        .call_with_policy(&policy, &id, ("tue",), |_| async {
            Ok::<_, AppError>(Report {
                rows: vec![2],
                generated_by: 1,
            })
        })
        .await
        .unwrap();

    assert_eq!(report.rows, vec![2]);
    assert_eq!(source, CacheSource::Computed);
    assert_eq!(FaultyStore::count(&store.counters().acquires), 0);
}

#[tokio::test]
async fn test_cancelled_holder_releases_lease_for_next_caller() {
    let store = FaultyStore::new();
    let core = CachingCore::new(store.clone(), fast_coordinator());
    let id = CallableId::new("Reports", "monthly");
    let policy = single_flight_policy();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        core.call_with_policy(&policy, &id, ("2024-07",), |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, AppError>(Report::default())
        }),
    )
    .await;
    assert!(abandoned.is_err());

    // Give the background release a chance to run
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.lease_holder("Lock_sf_Reports_monthly_2024-07"), None);

    let (report, source) = core
        .call_with_policy(&policy, &id, ("2024-07",), |_| async {
            Ok::<_, AppError>(Report {
                rows: vec![7],
                generated_by: 2,
            })
        })
        .await
        .unwrap();
    assert_eq!(source, CacheSource::Computed);
    assert_eq!(report.generated_by, 2);
}

#[tokio::test]
async fn test_contender_finding_corrupt_entry_invokes_directly() {
    let store = FaultyStore::new();
    store.hold_lease_forever("Lock_sf_Reports_monthly_2024-08");
    let core = CachingCore::new(store.clone(), fast_coordinator());
    let id = CallableId::new("Reports", "monthly");
    let invocations = AtomicU64::new(0);

    // The holder publishes garbage before the first poll at 20 ms
    let holder = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        holder.put_raw("sf_Reports_monthly_2024-08", "{\"rows\": [1,");
    });

    let (report, source) = core
        .call_with_policy(&single_flight_policy(), &id, ("2024-08",), |_| {
            invocations.fetch_add(1, Ordering::SeqCst);
            async {
                Ok::<_, AppError>(Report {
                    rows: vec![8],
                    generated_by: 3,
                })
            }
        })
        .await
        .unwrap();

    assert_eq!(source, CacheSource::Fallback);
    assert_eq!(report.rows, vec![8]);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(store.raw("sf_Reports_monthly_2024-08"), None);
    assert_eq!(FaultyStore::count(&store.counters().deletes), 1);

    let stats = core.stats().snapshot();
    assert_eq!(stats.corrupt_entries, 1);
    assert_eq!(stats.contention_waits, 1);
    assert_eq!(stats.fallbacks, 1);
}
