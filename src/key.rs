//! # Cache Key Derivation
//!
//! Keys are `{prefix}_{Type}_{member}_{arg1}_{arg2}...`. The same callable
//! and the same argument values always produce the same key, in every
//! process. Two different argument lists whose segments concatenate to the
//! same text share a key.
//!
//! An argument that has no JSON form (a map with non-string keys, a failing
//! `Serialize` impl) has no key at all: derivation fails with [`KeyError`]
//! and the caller is expected to skip the cache for that call.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

const SEPARATOR: char = '_';
const LOCK_MARKER: &str = "Lock";

/// Identity of a cached callable: declaring type plus member name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct CallableId {
    type_name: String,
    member: String,
}

impl CallableId {
    pub fn new(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    /// Identity derived from a Rust type, using its unqualified name
    pub fn of<T: ?Sized>(member: impl Into<String>) -> Self {
        let full = std::any::type_name::<T>();
        // Drop generic parameters before taking the last path segment
        let base = full.split('<').next().unwrap_or(full);
        let short = base.rsplit("::").next().unwrap_or(base);
        Self::new(short, member)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn member(&self) -> &str {
        &self.member
    }
}

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.member)
    }
}

/// An argument could not be rendered into a key segment
#[derive(Debug, Error)]
#[error("argument {position} cannot be used in a cache key: {source}")]
pub struct KeyError {
    /// Zero-based position in the argument list
    pub position: usize,
    #[source]
    pub source: serde_json::Error,
}

pub type KeyResult<T> = Result<T, KeyError>;

/// Ordered argument list of a callable, rendered into key segments
pub trait KeyArgs {
    fn key_segments(&self) -> KeyResult<Vec<String>>;
}

/// Render one argument to its stable textual form
///
/// Strings are used verbatim; every other value is compact JSON. JSON maps
/// serialize with sorted keys, so map arguments are stable too.
pub fn key_segment<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    Ok(match serde_json::to_value(value)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

impl KeyArgs for () {
    fn key_segments(&self) -> KeyResult<Vec<String>> {
        Ok(Vec::new())
    }
}

macro_rules! impl_key_args_for_tuple {
    ($($name:ident: $arg:ident),+) => {
        impl<$($name: Serialize),+> KeyArgs for ($($name,)+) {
            fn key_segments(&self) -> KeyResult<Vec<String>> {
                let ($($arg,)+) = self;
                let rendered = [$(key_segment($arg)),+];
                rendered
                    .into_iter()
                    .enumerate()
                    .map(|(position, segment)| {
                        segment.map_err(|source| KeyError { position, source })
                    })
                    .collect()
            }
        }
    };
}

impl_key_args_for_tuple!(A: a);
impl_key_args_for_tuple!(A: a, B: b);
impl_key_args_for_tuple!(A: a, B: b, C: c);
impl_key_args_for_tuple!(A: a, B: b, C: c, D: d);
impl_key_args_for_tuple!(A: a, B: b, C: c, D: d, E: e);
impl_key_args_for_tuple!(A: a, B: b, C: c, D: d, E: e, F: f);

/// Stateless key derivation
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    /// `{prefix}_{Type}_{member}`, shared by every key of the callable
    pub fn key_namespace(prefix: &str, id: &CallableId) -> String {
        format!(
            "{prefix}{SEPARATOR}{}{SEPARATOR}{}",
            id.type_name(),
            id.member()
        )
    }

    pub fn cache_key<A: KeyArgs + ?Sized>(
        prefix: &str,
        id: &CallableId,
        args: &A,
    ) -> KeyResult<String> {
        let mut key = Self::key_namespace(prefix, id);
        for segment in args.key_segments()? {
            key.push(SEPARATOR);
            key.push_str(&segment);
        }
        Ok(key)
    }

    pub fn lock_key(cache_key: &str) -> String {
        format!("{LOCK_MARKER}{SEPARATOR}{cache_key}")
    }
}
