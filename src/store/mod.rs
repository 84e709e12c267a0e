//! # Cache Store Module
//!
//! Backing stores for cached entries and single-flight leases.
//!
//! ## Architecture
//!
//! ```text
//! StoreProvider (enum dispatch)   <- circuit breaker for distributed backends
//!   ├── Redis(RedisStore)          <- ConnectionManager-based async Redis
//!   ├── Moka(MemoryStore)          <- in-process, per-entry TTL
//!   └── NoOp(NoOpStore)            <- always-miss fallback
//! ```
//!
//! - **Graceful degradation**: a backend that fails to connect is replaced
//!   by NoOp, never blocking startup
//! - **SCAN for patterns**: Redis pattern deletes never use KEYS
//! - **Owned leases**: releasing a lease is compare-and-delete on the holder
//!   token

pub mod errors;
pub mod provider;
pub mod providers;
pub mod traits;

pub use errors::{StoreError, StoreResult};
pub use provider::StoreProvider;
pub use providers::NoOpStore;
pub use traits::CacheStore;

#[cfg(feature = "store-redis")]
pub use providers::RedisStore;

#[cfg(feature = "store-moka")]
pub use providers::MemoryStore;
