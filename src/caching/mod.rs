//! # Read-Through Caching
//!
//! [`CachingCore`] runs the hit/miss/single-flight state machine over a
//! [`CacheStore`](crate::store::CacheStore); [`Cached`] binds one callable to
//! a core with a fixed identity and policy.

pub mod decorator;
pub mod engine;
pub mod source;
pub mod stats;

pub use decorator::Cached;
pub use engine::CachingCore;
pub use source::CacheSource;
pub use stats::{CacheStats, CacheStatsSnapshot};
