//! Distributed counter store backed by Redis.
//!
//! Every service instance pointed at the same Redis shares one counter per
//! token. Window boundaries come from Redis key expiry, so instances agree on
//! them without synchronized clocks.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use tracing::{debug, trace, warn};

use super::backend::CounterStore;
use super::token::Token;
use crate::error::{Result, TurnstileError};

/// Increment a counter and give it an expiry if it has none.
///
/// A key created by this call gets `ARGV[1]` milliseconds to live. A key that
/// somehow lost its TTL is repaired the same way, so no counter can outlive
/// its window forever.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Default prefix for counter keys.
pub const DEFAULT_KEY_PREFIX: &str = "turnstile";

/// Redis-backed counter store.
pub struct RedisStore {
    client: redis::Client,
    /// Shared multiplexed connection, dropped after a failure and reopened on
    /// the next call
    connection: Mutex<Option<MultiplexedConnection>>,
    script: redis::Script,
    key_prefix: String,
    command_timeout: Duration,
}

impl RedisStore {
    /// Create a store for the Redis server at `url`.
    ///
    /// No connection is made until the first command.
    pub fn new(url: &str, key_prefix: &str, command_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| TurnstileError::Settings(format!("Invalid Redis URL: {}", e)))?;

        Ok(Self {
            client,
            connection: Mutex::new(None),
            script: redis::Script::new(INCREMENT_SCRIPT),
            key_prefix: key_prefix.to_string(),
            command_timeout,
        })
    }

    /// Build the Redis key holding a token's counter.
    pub fn counter_key(&self, token: &Token) -> String {
        format!("{}:{}", self.key_prefix, token)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let cached = self.connection.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        debug!("Opening Redis connection");
        let conn = self.client.get_multiplexed_async_connection().await?;
        *self.connection.lock() = Some(conn.clone());
        Ok(conn)
    }

    /// Run `op` against the shared connection, bounded by the command timeout.
    ///
    /// Any failure, including a timeout, discards the cached connection.
    async fn with_timeout<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let result = tokio::time::timeout(self.command_timeout, async {
            let conn = self.connection().await?;
            op(conn).await.map_err(TurnstileError::from)
        })
        .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => Err(TurnstileError::StoreUnavailable(format!(
                "Redis did not respond within {}ms",
                self.command_timeout.as_millis()
            ))),
        };

        if let Err(ref e) = outcome {
            warn!(error = %e, "Redis command failed");
            self.connection.lock().take();
        }

        outcome
    }
}

/// Expiry to give a new counter, in milliseconds, saturating at `u64::MAX`.
fn ttl_millis(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn record_and_count(&self, token: &Token, interval: Duration) -> Result<u64> {
        let key = self.counter_key(token);
        let ttl_ms = ttl_millis(interval);

        let count: u64 = self
            .with_timeout(|mut conn| {
                let mut invocation = self.script.key(&key);
                invocation.arg(ttl_ms);
                async move { invocation.invoke_async::<_, u64>(&mut conn).await }
            })
            .await?;

        trace!(key = %key, count, "Recorded request in Redis");
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self
            .with_timeout(|mut conn| async move {
                redis::cmd("PING").query_async::<_, String>(&mut conn).await
            })
            .await?;
        Ok(())
    }
}
