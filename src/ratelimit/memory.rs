//! Process-local counter store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::backend::CounterStore;
use super::counter::CounterRecord;
use super::token::Token;
use crate::error::Result;

/// In-memory counter store.
///
/// Records live in a sharded map. Each increment runs under the shard lock of
/// its key, so concurrent requests for one token are linearized while
/// requests for tokens in other shards proceed independently. Expired windows
/// are reset lazily on access; [`InMemoryStore::sweep`] reclaims records for
/// tokens that went quiet.
///
/// Counters are visible only within the owning process.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    counters: DashMap<Token, CounterRecord>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live count for a token.
    ///
    /// Returns `None` if the token has no record or its window has elapsed.
    pub fn get_count(&self, token: &Token) -> Option<u64> {
        let now = Instant::now();
        self.counters
            .get(token)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.count())
    }

    /// Remove every record whose window has elapsed and return how many were
    /// removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.counters.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Get the number of tracked tokens, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no tokens are tracked.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn record_and_count(&self, token: &Token, interval: Duration) -> Result<u64> {
        let now = Instant::now();

        let mut entry = self
            .counters
            .entry(token.clone())
            .or_insert_with(|| CounterRecord::new(now, interval));
        let count = entry.value_mut().increment(now, interval);

        trace!(token = %token, count, "Recorded request in memory");
        Ok(count)
    }
}

/// Background task that periodically sweeps an [`InMemoryStore`].
pub struct Sweeper {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping `store` every `period`.
    pub fn start(store: Arc<InMemoryStore>, period: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = store.len(), "Swept expired counters");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        info!(period_secs = period.as_secs(), "Started in-memory counter sweeper");
        Self { shutdown_tx, handle }
    }

    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
        debug!("In-memory counter sweeper stopped");
    }
}
