#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, Moka in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Cacheable
//!
//! Read-through caching for async functions, backed by an external key-value
//! store.
//!
//! ## Overview
//!
//! A callable is wrapped together with a [`CachePolicy`]. Each call derives a
//! deterministic key from the callable's identity and arguments and looks it
//! up in the store. Hits are decoded and returned without running the
//! callable; misses run it once and write the result back with the policy's
//! TTL.
//!
//! ## Key Features
//!
//! - **Single-flight**: with `single_flight` on, one caller per key computes
//!   while the others wait on a bounded schedule for its result
//! - **Fail-open**: store outages and corrupt entries never change what the
//!   callable returns, only how long it takes
//! - **Pluggable stores**: Redis/Dragonfly, in-process Moka, or NoOp, chosen
//!   by configuration with graceful degradation
//!
//! ## Module Organization
//!
//! - [`caching`] - Caching core state machine and the `Cached` decorator
//! - [`policy`] - Per-callable policies and their registry
//! - [`key`] - Cache key derivation
//! - [`codec`] - Value encoding and corruption detection
//! - [`lock`] - Lease acquisition and the waiting-contender schedule
//! - [`store`] - Store trait and providers
//! - [`resilience`] - Circuit breaker for distributed stores
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cacheable::{CachePolicy, CachingCore, CallableId, LockCoordinator, StoreProvider};
//!
//! # #[derive(Debug)]
//! # struct AppError;
//! # impl From<cacheable::CacheableError> for AppError {
//! #     fn from(_: cacheable::CacheableError) -> Self { AppError }
//! # }
//! # async fn example() -> Result<(), AppError> {
//! let core = CachingCore::new(StoreProvider::memory(10_000), LockCoordinator::default());
//! let policy = CachePolicy::builder().ttl_seconds(30).single_flight(true).build();
//! let id = CallableId::new("PriceService", "quote");
//!
//! let (price, source) = core
//!     .call_with_policy(&policy, &id, ("EUR",), |(currency,)| async move {
//!         Ok::<_, AppError>(format!("1.00 {currency}"))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod caching;
pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod lock;
pub mod logging;
pub mod policy;
pub mod resilience;
pub mod store;

pub use caching::{CacheSource, CacheStats, CacheStatsSnapshot, Cached, CachingCore};
pub use codec::{CodecError, JsonCodec, ValueCodec};
pub use config::{CacheableConfig, ConfigManager, ConfigurationError};
pub use error::{CacheableError, Result};
pub use key::{CallableId, KeyArgs, KeyError, KeyGenerator};
pub use lock::{Lease, LeaseGuard, LeaseSettings, LockCoordinator, WaitSchedule};
pub use policy::{CachePolicy, PolicyRegistry};
pub use store::{CacheStore, NoOpStore, StoreError, StoreProvider};
