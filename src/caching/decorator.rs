//! Decorator binding a callable to its identity and policy.

use super::{CacheSource, CachingCore};
use crate::codec::{JsonCodec, ValueCodec};
use crate::error::{CacheableError, Result};
use crate::key::{CallableId, KeyArgs};
use crate::policy::CachePolicy;
use crate::store::CacheStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// A callable wrapped in read-through caching
///
/// Has the same call shape as the wrapped function: `f(args)` becomes
/// `cached.call(args)`. Arguments are passed as a tuple (or `()`), which is
/// also what the key is derived from.
///
/// ```rust,ignore
/// let get_user = Cached::new(
///     Arc::clone(&core),
///     CallableId::new("UserService", "get_user"),
///     CachePolicy::builder().ttl_seconds(60).single_flight(true).build(),
///     |(id,): (u64,)| async move { repo.load(id).await },
/// );
/// let user = get_user.call((42,)).await?;
/// ```
pub struct Cached<F, S, C = JsonCodec> {
    core: Arc<CachingCore<S, C>>,
    id: CallableId,
    policy: Arc<CachePolicy>,
    f: F,
}

impl<F, S, C> std::fmt::Debug for Cached<F, S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cached")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<F, S: CacheStore + 'static, C: ValueCodec> Cached<F, S, C> {
    pub fn new(core: Arc<CachingCore<S, C>>, id: CallableId, policy: CachePolicy, f: F) -> Self {
        Self {
            core,
            id,
            policy: Arc::new(policy),
            f,
        }
    }

    /// Wrap `f` using the policy registered for `id`, if there is one
    pub fn registered(core: Arc<CachingCore<S, C>>, id: CallableId, f: F) -> Option<Self> {
        let policy = core.policies().resolve(&id)?;
        Some(Self {
            core,
            id,
            policy,
            f,
        })
    }

    pub fn id(&self) -> &CallableId {
        &self.id
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub async fn call<A, T, E, Fut>(&self, args: A) -> std::result::Result<T, E>
    where
        F: Fn(A) -> Fut,
        A: KeyArgs,
        T: Serialize + DeserializeOwned + Default,
        E: From<CacheableError>,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.call_traced(args).await.map(|(value, _)| value)
    }

    pub async fn call_traced<A, T, E, Fut>(
        &self,
        args: A,
    ) -> std::result::Result<(T, CacheSource), E>
    where
        F: Fn(A) -> Fut,
        A: KeyArgs,
        T: Serialize + DeserializeOwned + Default,
        E: From<CacheableError>,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.core
            .call_with_policy(&self.policy, &self.id, args, &self.f)
            .await
    }

    pub async fn invalidate<A: KeyArgs + ?Sized>(&self, args: &A) -> Result<()> {
        self.core.invalidate(&self.policy, &self.id, args).await
    }

    pub async fn invalidate_all(&self) -> Result<u64> {
        self.core.invalidate_all(&self.policy, &self.id).await
    }
}
