//! Counter backend trait for abstracting local and remote counter actors.

use async_trait::async_trait;

use super::counter::Decision;
use super::key::RateLimitKey;
use super::limiter::CounterRegistry;
use super::policy::RateLimitPolicy;
use crate::error::Result;

/// Trait for counter actor implementations.
///
/// This trait abstracts over the in-process [`CounterRegistry`] and the
/// HTTP-addressed [`RemoteCounters`](super::RemoteCounters) so the gateway
/// can work with either.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Count one request for `key` and decide it against `policy`.
    async fn check(&self, key: &RateLimitKey, policy: RateLimitPolicy) -> Result<Decision>;

    /// Return `key` to the never-seen state.
    async fn reset(&self, key: &RateLimitKey) -> Result<()>;
}

#[async_trait]
impl CounterBackend for CounterRegistry {
    async fn check(&self, key: &RateLimitKey, policy: RateLimitPolicy) -> Result<Decision> {
        Ok(self.check_and_increment(key, policy))
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<()> {
        CounterRegistry::reset(self, key);
        Ok(())
    }
}
