//! # Cache Policies
//!
//! A [`CachePolicy`] is attached to a callable when it is wrapped or
//! registered and never changes afterwards. [`PolicyRegistry`] maps callable
//! identities to their policies; a callable without a registered policy is
//! invoked directly.

use crate::config::PolicyEntry;
use crate::error::CacheableError;
use crate::key::CallableId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Immutable caching policy for one callable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    ttl_seconds: u64,
    key_prefix: String,
    high_availability: bool,
    single_flight: bool,
}

impl CachePolicy {
    pub const DEFAULT_TTL_SECONDS: u64 = 300;

    pub fn builder() -> CachePolicyBuilder {
        CachePolicyBuilder::default()
    }

    /// How long a stored entry lives
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// When true, store failures before the callable runs are contained and
    /// the callable is invoked directly. When false they reach the caller.
    pub fn high_availability(&self) -> bool {
        self.high_availability
    }

    /// When true, at most one caller per key computes on a miss
    pub fn single_flight(&self) -> bool {
        self.single_flight
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_seconds == 0 {
            return Err("ttl_seconds must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: Self::DEFAULT_TTL_SECONDS,
            key_prefix: String::new(),
            high_availability: true,
            single_flight: false,
        }
    }
}

/// Builder for [`CachePolicy`]
#[derive(Debug, Clone, Default)]
pub struct CachePolicyBuilder {
    policy: CachePolicy,
}

impl CachePolicyBuilder {
    pub fn ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.policy.ttl_seconds = ttl_seconds;
        self
    }

    pub fn key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.policy.key_prefix = key_prefix.into();
        self
    }

    pub fn high_availability(mut self, high_availability: bool) -> Self {
        self.policy.high_availability = high_availability;
        self
    }

    pub fn single_flight(mut self, single_flight: bool) -> Self {
        self.policy.single_flight = single_flight;
        self
    }

    pub fn build(self) -> CachePolicy {
        self.policy
    }
}

/// Concurrent map from callable identity to policy
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    policies: DashMap<CallableId, Arc<CachePolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `[[policies]]` configuration entries
    pub fn from_config(entries: &[PolicyEntry]) -> Self {
        let registry = Self::new();
        for entry in entries {
            registry.register(entry.callable_id(), entry.to_policy());
        }
        registry
    }

    /// Register (or replace) the policy of a callable
    pub fn register(&self, id: CallableId, policy: CachePolicy) {
        debug!(
            callable = %id,
            ttl_seconds = policy.ttl_seconds(),
            single_flight = policy.single_flight(),
            "Cache policy registered"
        );
        self.policies.insert(id, Arc::new(policy));
    }

    /// Register a policy after validating it
    pub fn try_register(&self, id: CallableId, policy: CachePolicy) -> crate::Result<()> {
        policy
            .validate()
            .map_err(|reason| CacheableError::Validation(format!("{id}: {reason}")))?;
        self.register(id, policy);
        Ok(())
    }

    pub fn resolve(&self, id: &CallableId) -> Option<Arc<CachePolicy>> {
        self.policies.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = CachePolicy::default();
        assert_eq!(policy.ttl(), Duration::from_secs(300));
        assert_eq!(policy.key_prefix(), "");
        assert!(policy.high_availability());
        assert!(!policy.single_flight());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let policy = CachePolicy::builder()
            .ttl_seconds(30)
            .key_prefix("test")
            .single_flight(true)
            .high_availability(false)
            .build();

        assert_eq!(policy.ttl_seconds(), 30);
        assert_eq!(policy.key_prefix(), "test");
        assert!(policy.single_flight());
        assert!(!policy.high_availability());
    }

    #[test]
    fn test_zero_ttl_is_invalid() {
        let policy = CachePolicy::builder().ttl_seconds(0).build();
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_registry_resolves_registered_callables_only() {
        let registry = PolicyRegistry::new();
        let id = CallableId::new("DemoService", "get_time");
        registry.register(id.clone(), CachePolicy::builder().ttl_seconds(30).build());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(&id).unwrap().ttl_seconds(), 30);
        assert!(registry
            .resolve(&CallableId::new("DemoService", "get_date"))
            .is_none());
    }

    #[test]
    fn test_try_register_rejects_invalid_policy() {
        let registry = PolicyRegistry::new();
        let id = CallableId::new("DemoService", "get_time");

        let err = registry
            .try_register(id.clone(), CachePolicy::builder().ttl_seconds(0).build())
            .unwrap_err();
        assert!(matches!(err, CacheableError::Validation(_)));
        assert!(registry.is_empty());

        registry.try_register(id, CachePolicy::default()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_from_config_entries() {
        let entries = vec![PolicyEntry {
            type_name: "DemoService".to_string(),
            member: "get_time".to_string(),
            ttl_seconds: 30,
            key_prefix: "test".to_string(),
            high_availability: true,
            single_flight: true,
        }];
        let registry = PolicyRegistry::from_config(&entries);
        let policy = registry
            .resolve(&CallableId::new("DemoService", "get_time"))
            .unwrap();

        assert_eq!(policy.key_prefix(), "test");
        assert!(policy.single_flight());
    }
}
