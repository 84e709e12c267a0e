//! # Cacheable Configuration
//!
//! Layered configuration for the caching layer: built-in defaults, then
//! `cacheable.toml`, then an environment-specific `cacheable.{env}.toml`,
//! then `CACHEABLE__*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cacheable::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let backend = &manager.config().store.backend;
//! let attempts = manager.config().wait.attempts;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::key::CallableId;
use crate::lock::{LeaseSettings, WaitSchedule};
use crate::policy::CachePolicy;
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring cacheable.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheableConfig {
    /// Backing store selection and connection settings
    pub store: StoreConfig,

    /// Single-flight lease settings
    pub lease: LeaseConfig,

    /// Waiting-contender poll schedule
    pub wait: WaitConfig,

    /// Circuit breaker protecting distributed stores
    pub circuit_breaker: CircuitBreakerSettings,

    /// Per-callable caching policies
    pub policies: Vec<PolicyEntry>,
}

/// Store backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// When false the NoOp store is used and every call computes
    pub enabled: bool,

    /// One of `redis`, `dragonfly`, `moka`, `memory`, `in-memory`, `noop`
    pub backend: String,

    pub redis: Option<RedisConfig>,

    pub moka: Option<MokaConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "redis".to_string(),
            redis: Some(RedisConfig::default()),
            moka: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MokaConfig {
    pub max_capacity: u64,
}

impl Default for MokaConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

/// Lease settings for single-flight computation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Lease lifetime; bounds how long a crashed holder can block a key
    pub ttl_seconds: u64,

    /// Stable identifier of this worker. Defaults to `{HOSTNAME}-{pid}`.
    pub holder_id: Option<String>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 10,
            holder_id: None,
        }
    }
}

impl LeaseConfig {
    pub fn to_lease_settings(&self) -> LeaseSettings {
        let holder_id = self
            .holder_id
            .clone()
            .unwrap_or_else(LeaseSettings::default_holder_id);
        LeaseSettings::new(Duration::from_secs(self.ttl_seconds), holder_id)
    }
}

/// Poll schedule for callers that lose the lease race
///
/// Attempt `i` (zero-based) sleeps `initial_delay_ms + i * delay_step_ms`
/// before polling the store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitConfig {
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub delay_step_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay_ms: 500,
            delay_step_ms: 100,
        }
    }
}

impl WaitConfig {
    pub fn to_wait_schedule(&self) -> WaitSchedule {
        WaitSchedule::linear(
            self.attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.delay_step_ms),
        )
    }
}

/// Circuit breaker settings for distributed stores
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout_seconds: 30,
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_duration: Duration::from_secs(self.timeout_seconds),
            success_threshold: self.success_threshold,
        }
    }
}

/// A caching policy declared for one callable
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyEntry {
    pub type_name: String,
    pub member: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default)]
    pub key_prefix: String,
    #[serde(default = "default_true")]
    pub high_availability: bool,
    #[serde(default)]
    pub single_flight: bool,
}

fn default_ttl_seconds() -> u64 {
    CachePolicy::DEFAULT_TTL_SECONDS
}

fn default_true() -> bool {
    true
}

impl PolicyEntry {
    pub fn callable_id(&self) -> CallableId {
        CallableId::new(self.type_name.clone(), self.member.clone())
    }

    pub fn to_policy(&self) -> CachePolicy {
        CachePolicy::builder()
            .ttl_seconds(self.ttl_seconds)
            .key_prefix(self.key_prefix.clone())
            .high_availability(self.high_availability)
            .single_flight(self.single_flight)
            .build()
    }
}

impl CacheableConfig {
    /// Validate numeric bounds and policy declarations
    pub fn validate(&self) -> ConfigResult<()> {
        if self.lease.ttl_seconds == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "lease.ttl_seconds".to_string(),
                value: "0".to_string(),
                context: "lease TTL must be greater than 0".to_string(),
            });
        }

        self.wait
            .to_wait_schedule()
            .validate()
            .map_err(|context| ConfigurationError::InvalidValue {
                field: "wait".to_string(),
                value: format!("{:?}", self.wait),
                context,
            })?;

        if self.circuit_breaker.enabled {
            self.circuit_breaker
                .to_resilience_config()
                .validate()
                .map_err(|context| ConfigurationError::InvalidValue {
                    field: "circuit_breaker".to_string(),
                    value: format!("{:?}", self.circuit_breaker),
                    context,
                })?;
        }

        if let Some(redis) = &self.store.redis {
            if redis.connection_timeout_seconds == 0 {
                return Err(ConfigurationError::InvalidValue {
                    field: "store.redis.connection_timeout_seconds".to_string(),
                    value: "0".to_string(),
                    context: "connection timeout must be greater than 0".to_string(),
                });
            }
        }

        for entry in &self.policies {
            if entry.type_name.is_empty() || entry.member.is_empty() {
                return Err(ConfigurationError::MissingRequiredField {
                    field: "type_name/member".to_string(),
                    context: "policies".to_string(),
                });
            }
            entry
                .to_policy()
                .validate()
                .map_err(|context| ConfigurationError::InvalidValue {
                    field: format!("policies[{}]", entry.callable_id()),
                    value: entry.ttl_seconds.to_string(),
                    context,
                })?;
        }

        Ok(())
    }
}
