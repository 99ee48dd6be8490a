//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::backend::CounterStore;
use super::token::Token;
use crate::error::{Result, TurnstileError};

/// Longest accepted window, in seconds.
pub const MAX_INTERVAL_SECS: u64 = 10_000;
/// Default window length when nothing is configured.
const DEFAULT_INTERVAL_SECS: u64 = 60;
/// Default request ceiling when nothing is configured.
const DEFAULT_LIMIT: u64 = 100;

/// The process-wide limit: at most `limit` requests per token in each
/// window of `interval` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Window length in seconds
    pub interval: u64,
    /// Maximum requests allowed in one window
    pub limit: u64,
}

impl LimitConfig {
    /// Create a validated configuration.
    pub fn new(interval: u64, limit: u64) -> Result<Self> {
        let config = Self { interval, limit };
        config.validate()?;
        Ok(config)
    }

    /// Check that both fields are in range.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(TurnstileError::InvalidConfig(
                "interval must be at least 1 second".into(),
            ));
        }
        if self.interval > MAX_INTERVAL_SECS {
            return Err(TurnstileError::InvalidConfig(format!(
                "interval must be at most {} seconds",
                MAX_INTERVAL_SECS
            )));
        }
        if self.limit == 0 {
            return Err(TurnstileError::InvalidConfig("limit must be at least 1".into()));
        }
        Ok(())
    }

    /// Get the window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL_SECS,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the token is over its allowance
    pub limited: bool,
    /// Requests counted in the token's current window, including this one
    pub count: u64,
    /// The limit the count was compared against
    pub limit: u64,
}

impl Decision {
    /// Get the remaining quota in the current window.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// The rate limiter that turns store counts into admission decisions.
///
/// This struct is thread-safe and can be shared across multiple tasks. The
/// configuration is read as one snapshot per decision, so a concurrent
/// [`configure`](RateLimiter::configure) is observed either fully or not at all.
pub struct RateLimiter {
    /// Where per-token counters live
    store: Arc<dyn CounterStore>,
    /// Current process-wide limit
    config: RwLock<LimitConfig>,
}

impl RateLimiter {
    /// Create a new rate limiter with the default configuration.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_config(store, LimitConfig::default())
    }

    /// Create a new rate limiter with an initial configuration.
    pub fn with_config(store: Arc<dyn CounterStore>, config: LimitConfig) -> Self {
        Self {
            store,
            config: RwLock::new(config),
        }
    }

    /// Replace the configuration.
    ///
    /// Invalid values are rejected and the current configuration is kept.
    /// Counters already in flight keep their window; the new limit applies to
    /// the next decision for every token.
    pub fn configure(&self, interval: u64, limit: u64) -> Result<LimitConfig> {
        let config = LimitConfig::new(interval, limit)?;

        let previous = std::mem::replace(&mut *self.config.write(), config);
        info!(
            interval = config.interval,
            limit = config.limit,
            previous_interval = previous.interval,
            previous_limit = previous.limit,
            "Rate limit configuration updated"
        );

        Ok(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> LimitConfig {
        *self.config.read()
    }

    /// Get the counter store.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Record a request for `token` and decide whether it is over the limit.
    pub async fn check(&self, token: &str) -> Result<Decision> {
        let token = Token::parse(token)?;
        let config = self.config();

        trace!(token = %token, interval = config.interval, "Checking rate limit");

        let count = self.store.record_and_count(&token, config.window()).await?;
        let decision = Decision {
            limited: count > config.limit,
            count,
            limit: config.limit,
        };

        if decision.limited {
            debug!(token = %token, count, limit = config.limit, "Rate limit exceeded");
        } else {
            trace!(token = %token, count, remaining = decision.remaining(), "Request admitted");
        }

        Ok(decision)
    }

    /// Whether `token` is currently over its allowance.
    ///
    /// Every call counts as a request, including calls that end up limited.
    pub async fn is_rate_limited(&self, token: &str) -> Result<bool> {
        self.check(token).await.map(|decision| decision.limited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_limiter(interval: u64, limit: u64) -> RateLimiter {
        let limiter = RateLimiter::new(Arc::new(InMemoryStore::new()));
        limiter.configure(interval, limit).unwrap();
        limiter
    }

    /// Store that counts how often it is called and always fails.
    #[derive(Default)]
    struct DownStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CounterStore for DownStore {
        async fn record_and_count(&self, _token: &Token, _interval: Duration) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TurnstileError::StoreUnavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_default_config() {
        let config = LimitConfig::default();
        assert_eq!(config.interval, 60);
        assert_eq!(config.limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_limit_config_bounds() {
        assert!(LimitConfig::new(1, 1).is_ok());
        assert!(LimitConfig::new(MAX_INTERVAL_SECS, 1).is_ok());
        assert!(matches!(LimitConfig::new(0, 5), Err(TurnstileError::InvalidConfig(_))));
        assert!(matches!(
            LimitConfig::new(MAX_INTERVAL_SECS + 1, 5),
            Err(TurnstileError::InvalidConfig(_))
        ));
        assert!(matches!(LimitConfig::new(10, 0), Err(TurnstileError::InvalidConfig(_))));
    }

    #[test]
    fn test_limit_config_json_shape() {
        let config: LimitConfig = serde_json::from_str(r#"{"interval": 60, "limit": 2}"#).unwrap();
        assert_eq!(config, LimitConfig { interval: 60, limit: 2 });
        assert_eq!(
            serde_json::to_value(config).unwrap(),
            serde_json::json!({"interval": 60, "limit": 2})
        );
    }

    #[test]
    fn test_configure_rejection_keeps_previous() {
        let limiter = memory_limiter(30, 7);

        let err = limiter.configure(0, 5).unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidConfig(_)));
        assert_eq!(limiter.config(), LimitConfig { interval: 30, limit: 7 });
    }

    #[tokio::test]
    async fn test_fresh_token_is_admitted_with_count_one() {
        let limiter = memory_limiter(60, 5);

        let decision = limiter.check("fresh").await.unwrap();
        assert!(!decision.limited);
        assert_eq!(decision.count, 1);
        assert_eq!(decision.remaining(), 4);
    }

    #[tokio::test]
    async fn test_limited_after_exceeding_limit() {
        let limiter = memory_limiter(60, 3);

        for _ in 0..3 {
            assert!(!limiter.is_rate_limited("u1").await.unwrap());
        }
        assert!(limiter.is_rate_limited("u1").await.unwrap());
        assert!(limiter.is_rate_limited("u1").await.unwrap());

        // Other tokens are unaffected.
        assert!(!limiter.is_rate_limited("u2").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_example_sequence_with_reset() {
        let limiter = memory_limiter(60, 2);

        assert!(!limiter.is_rate_limited("u1").await.unwrap());
        assert!(!limiter.is_rate_limited("u1").await.unwrap());
        assert!(limiter.is_rate_limited("u1").await.unwrap());

        tokio::time::advance(Duration::from_secs(60)).await;

        let decision = limiter.check("u1").await.unwrap();
        assert!(!decision.limited);
        assert_eq!(decision.count, 1);
    }

    #[tokio::test]
    async fn test_lowering_limit_applies_mid_window() {
        let limiter = memory_limiter(60, 10);

        for _ in 0..4 {
            assert!(!limiter.is_rate_limited("u1").await.unwrap());
        }

        limiter.configure(60, 3).unwrap();
        let decision = limiter.check("u1").await.unwrap();
        assert!(decision.limited);
        assert_eq!(decision.count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_keeps_live_window() {
        let limiter = memory_limiter(60, 2);
        limiter.is_rate_limited("u1").await.unwrap();
        limiter.is_rate_limited("u1").await.unwrap();

        limiter.configure(10, 2).unwrap();
        tokio::time::advance(Duration::from_secs(15)).await;

        // Still inside the original 60s window.
        assert!(limiter.is_rate_limited("u1").await.unwrap());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(!limiter.is_rate_limited("u1").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_split_exactly_at_limit() {
        let limiter = Arc::new(memory_limiter(60, 10));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.is_rate_limited("shared").await.unwrap() })
            })
            .collect();

        let mut limited = 0;
        for task in tasks {
            if task.await.unwrap() {
                limited += 1;
            }
        }

        assert_eq!(limited, 40);
    }

    #[tokio::test]
    async fn test_invalid_token_never_reaches_store() {
        let store = Arc::new(DownStore::default());
        let limiter = RateLimiter::new(store.clone());

        let err = limiter.is_rate_limited("").await.unwrap_err();
        assert!(matches!(err, TurnstileError::InvalidToken(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_propagates_distinctly() {
        let store = Arc::new(DownStore::default());
        let limiter = RateLimiter::new(store.clone());

        let err = limiter.is_rate_limited("u1").await.unwrap_err();
        assert!(matches!(err, TurnstileError::StoreUnavailable(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
