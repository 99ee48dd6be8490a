//! Counter store trait for abstracting in-memory and distributed storage.

use std::time::Duration;

use async_trait::async_trait;

use super::token::Token;
use crate::error::Result;

/// Trait for counter store implementations.
///
/// This trait abstracts over the process-local [`InMemoryStore`] and the
/// Redis-backed [`RedisStore`] so the [`RateLimiter`] can work with either.
///
/// [`InMemoryStore`]: super::InMemoryStore
/// [`RedisStore`]: super::RedisStore
/// [`RateLimiter`]: super::RateLimiter
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Record one request for `token` and return the count for its current
    /// fixed window, including this request.
    ///
    /// A token with no live window starts a new one of length `interval`.
    async fn record_and_count(&self, token: &Token, interval: Duration) -> Result<u64>;

    /// Check that the store can serve requests.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
