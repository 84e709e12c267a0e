use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the value returned by a cached call came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Decoded from a stored entry
    Hit,
    /// The callable ran on a miss and its result was written back
    Computed,
    /// Another caller held the lease; its entry appeared while waiting
    AwaitedHolder,
    /// Another caller held the lease and no entry appeared in time
    LeaseTimeoutDefault,
    /// No policy applies; the callable ran without touching the store
    Bypassed,
    /// The store failed or the awaited entry was corrupt; the callable ran directly
    Fallback,
}

impl CacheSource {
    /// Whether the callable was invoked by this call
    pub fn invoked_callable(&self) -> bool {
        matches!(self, Self::Computed | Self::Bypassed | Self::Fallback)
    }
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hit => "hit",
            Self::Computed => "computed",
            Self::AwaitedHolder => "awaited_holder",
            Self::LeaseTimeoutDefault => "lease_timeout_default",
            Self::Bypassed => "bypassed",
            Self::Fallback => "fallback",
        };
        f.write_str(name)
    }
}
