//! # Value Codec
//!
//! Converts callable results to and from the string form kept in the store.
//! A stored string that no longer decodes into the expected type is reported
//! as [`CodecError::CorruptEntry`]; the caching core evicts it and recomputes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be serialized
    #[error("Failed to encode cache value: {0}")]
    Encode(String),

    /// A stored entry is unreadable or has the wrong shape
    #[error("Corrupt cache entry: {0}")]
    CorruptEntry(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Encoding contract between the caching core and the store
pub trait ValueCodec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> CodecResult<String>;

    fn decode<T: DeserializeOwned>(&self, raw: &str) -> CodecResult<T>;

    fn name(&self) -> &'static str;
}

/// JSON codec backed by `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> CodecResult<String> {
        serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, raw: &str) -> CodecResult<T> {
        serde_json::from_str(raw).map_err(|e| CodecError::CorruptEntry(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
