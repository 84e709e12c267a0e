//! Cacheable demo
//!
//! Wraps a "current time" service in a single-flight cache policy and calls
//! it twice. With a reachable store the second call is a hit and prints the
//! same id and timestamp as the first.
//!
//! ```text
//! CACHEABLE__STORE__BACKEND=memory cargo run --bin cacheable-demo
//! ```

use anyhow::Context;
use cacheable::config::ConfigManager;
use cacheable::logging::{init_structured_logging, log_cache_operation};
use cacheable::store::CacheStore;
use cacheable::{CachePolicy, Cached, CachingCore, CallableId, StoreProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TimeModel {
    id: u64,
    time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct DemoService {
    invocations: AtomicU64,
}

impl DemoService {
    async fn get_time(&self) -> anyhow::Result<TimeModel> {
        let id = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TimeModel {
            id,
            time: Utc::now(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("loading cache configuration")?;
    let config = manager.config();

    let store =
        StoreProvider::from_config_graceful(&config.store, Some(&config.circuit_breaker)).await;
    info!(
        provider = store.provider_name(),
        enabled = store.is_enabled(),
        environment = manager.environment(),
        "Store ready"
    );

    let core = Arc::new(CachingCore::from_config(store, config));
    let id = CallableId::of::<DemoService>("get_time");
    if core.policies().resolve(&id).is_none() {
        core.policies().try_register(
            id.clone(),
            CachePolicy::builder()
                .ttl_seconds(30)
                .key_prefix("test")
                .single_flight(true)
                .build(),
        )?;
    }

    let service = DemoService::default();
    let get_time = Cached::registered(Arc::clone(&core), id.clone(), |()| service.get_time())
        .context("no cache policy for DemoService.get_time")?;

    for _ in 0..2 {
        let started = Instant::now();
        let (model, source) = get_time.call_traced(()).await?;
        log_cache_operation(
            "call",
            &id.to_string(),
            source,
            Some(started.elapsed().as_millis() as u64),
            None,
        );
        println!("{}:{}", model.id, model.time);
    }

    let stats = core.stats().snapshot();
    info!(
        hits = stats.hits,
        computations = stats.computations,
        fallbacks = stats.fallbacks,
        callable_runs = stats.invocations,
        invocations = service.invocations.load(Ordering::SeqCst),
        "Demo finished"
    );
    Ok(())
}
