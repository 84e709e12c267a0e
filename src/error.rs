//! Crate-level error type.
//!
//! Infrastructure failures are contained by the caching core and only reach a
//! caller when the callable's policy turns high availability off. In that
//! case they are converted into the callable's own error type through
//! `From<CacheableError>`.

use crate::codec::CodecError;
use crate::config::ConfigurationError;
use crate::key::KeyError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheableError {
    /// The backing store could not be reached or rejected an operation
    #[error("Cache store error: {0}")]
    Store(#[from] StoreError),

    /// A value could not be encoded for, or decoded from, the store
    #[error("Cache codec error: {0}")]
    Codec(#[from] CodecError),

    /// An argument could not be turned into a cache key
    #[error("Cache key error: {0}")]
    Key(#[from] KeyError),

    /// Invalid or unloadable configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Policy or schedule failed validation
    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CacheableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts_with_context() {
        let err: CacheableError = StoreError::BackendError("GET failed".to_string()).into();
        assert!(matches!(err, CacheableError::Store(_)));
        assert_eq!(
            err.to_string(),
            "Cache store error: Cache backend error: GET failed"
        );
    }

    #[test]
    fn test_anyhow_absorbs_cacheable_error() {
        let err: anyhow::Error = CacheableError::Validation("ttl".to_string()).into();
        assert!(err.downcast_ref::<CacheableError>().is_some());
    }
}
