//! Store provider implementations

pub mod noop;

#[cfg(feature = "store-redis")]
pub mod redis;

#[cfg(feature = "store-moka")]
pub mod moka;

pub use noop::NoOpStore;

#[cfg(feature = "store-redis")]
pub use self::redis::RedisStore;

#[cfg(feature = "store-moka")]
pub use self::moka::MemoryStore;
