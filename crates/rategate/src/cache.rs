//! Leader/follower coalescing cache

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use rategate_core::{KvStore, LockErrorKind, RateError, Result, TimeoutKind};

use crate::breaker::CircuitBreaker;
use crate::lock::{DistributedLock, LockConfig};
use crate::waiter::{Waiter, waiters_key};

/// Key of the stale entry backing a cache key
pub fn stale_key(key: &str) -> String {
    format!("stale:{key}")
}

/// Tunables for the coalescing cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Validity window of fresh entries
    pub fresh_ttl: Duration,

    /// Fallback window of stale entries
    pub stale_ttl: Duration,

    /// Bound on one follower wait
    pub follower_timeout: Duration,

    /// Total follower wait attempts before falling back
    pub max_follower_attempts: u32,

    /// Base of the exponential backoff between follower attempts
    pub follower_backoff: Duration,

    /// Hard deadline on one upstream compute
    pub upstream_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_ttl: Duration::from_secs(300),
            stale_ttl: Duration::from_secs(900),
            follower_timeout: Duration::from_secs(15),
            max_follower_attempts: 2,
            follower_backoff: Duration::from_millis(500),
            upstream_timeout: Duration::from_secs(30),
        }
    }
}

/// Read-through cache that elects one leader per key to call upstream
///
/// Concurrent misses for the same key coalesce onto a single upstream call:
/// the election winner computes under the distributed lock and broadcasts
/// the result to every registered follower, while losers block on private
/// queues. Failures degrade to the stale entry when one exists.
pub struct CoalescingCache<S> {
    store: Arc<S>,
    lock: DistributedLock<S>,
    breaker: CircuitBreaker,
    config: CacheConfig,
}

impl<S: KvStore> CoalescingCache<S> {
    /// Create a cache with default lock and breaker settings
    pub fn new(store: Arc<S>, config: CacheConfig) -> Self {
        Self::with_parts(
            store.clone(),
            DistributedLock::new(store, LockConfig::default()),
            CircuitBreaker::default(),
            config,
        )
    }

    /// Create a cache from explicitly constructed parts
    pub fn with_parts(
        store: Arc<S>,
        lock: DistributedLock<S>,
        breaker: CircuitBreaker,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            lock,
            breaker,
            config,
        }
    }

    /// The process-local breaker guarding the upstream
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Return the cached value for `key`, computing it at most once per
    /// validity window across all processes
    ///
    /// Fast path: a decodable fresh entry is returned as-is. On a miss, the
    /// election winner runs `compute` under the breaker and a hard timeout,
    /// writes the fresh and stale entries, and notifies every registered
    /// follower; losers block for the winner's result. Every failure path
    /// degrades to the stale entry, and only when that is also absent does
    /// `Unavailable` surface.
    pub async fn fetch<F, Fut>(&self, key: &str, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        match self.read_fresh(key).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(err) => {
                self.breaker.record_failure();
                tracing::warn!(key, %err, "fresh read failed, falling back");
                return self.fallback(key).await;
            }
        }

        if self.breaker.is_open() {
            tracing::debug!(key, "breaker open, serving stale");
            return self.fallback(key).await;
        }

        match self.lead(key, compute).await {
            Ok(value) => Ok(value),
            Err(RateError::Lock(LockErrorKind::NotAcquired)) => self.follow(key).await,
            Err(err) => {
                // Leader failures that bypassed the breaker wrapper are
                // recorded here; wrapped failures were already counted
                if !matches!(
                    err,
                    RateError::Api { .. }
                        | RateError::BreakerOpen
                        | RateError::Timeout(TimeoutKind::Upstream)
                ) {
                    self.breaker.record_failure();
                }
                tracing::warn!(key, %err, "leader branch failed, falling back");
                self.fallback(key).await
            }
        }
    }

    /// Leader branch: compute under the lock, publish, notify followers
    async fn lead<F, Fut>(&self, key: &str, compute: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        self.lock
            .with_lock(key, || async move {
                // Several processes may have raced through the miss; the
                // winner fills the entry, so check again under the lock.
                if let Some(value) = self.read_fresh(key).await? {
                    tracing::debug!(key, "entry filled during election");
                    return Ok(value);
                }

                let upstream_timeout = self.config.upstream_timeout;
                let value = self
                    .breaker
                    .call(|| async move {
                        match tokio::time::timeout(upstream_timeout, compute()).await {
                            Ok(result) => result,
                            Err(_) => Err(RateError::Timeout(TimeoutKind::Upstream)),
                        }
                    })
                    .await?;

                let payload = serde_json::to_vec(&value)
                    .map_err(|e| RateError::Serialization(e.to_string()))?;
                // Stale first: a fresh entry must never exist without its
                // stale counterpart
                self.store
                    .set(&stale_key(key), &payload, self.config.stale_ttl)
                    .await?;
                self.store.set(key, &payload, self.config.fresh_ttl).await?;

                self.notify_waiters(key, &payload).await;
                tracing::debug!(key, "entry refreshed");
                Ok(value)
            })
            .await
    }

    /// Follower branch: block for the leader's result, with bounded retry
    async fn follow(&self, key: &str) -> Result<Value> {
        let mut attempt = 1u32;
        loop {
            let waiter =
                match Waiter::register(self.store.clone(), key, self.config.follower_timeout).await
                {
                    Ok(waiter) => waiter,
                    Err(err) => {
                        tracing::warn!(key, %err, "follower registration failed, falling back");
                        return self.fallback(key).await;
                    }
                };

            match waiter.wait().await {
                Ok(value) => return Ok(value),
                Err(RateError::Timeout(TimeoutKind::FollowerWait)) => {
                    if attempt >= self.config.max_follower_attempts {
                        tracing::debug!(key, attempt, "follower wait exhausted, falling back");
                        return self.fallback(key).await;
                    }
                    let backoff = self.config.follower_backoff * 2u32.pow(attempt - 1);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(key, %err, "follower wait failed, falling back");
                    return self.fallback(key).await;
                }
            }
        }
    }

    /// Read and decode the fresh entry; an undecodable entry is a miss
    async fn read_fresh(&self, key: &str) -> Result<Option<Value>> {
        match self.store.get(key).await? {
            Some(payload) => match serde_json::from_slice(&payload) {
                Ok(value) => Ok(Some(value)),
                Err(err) => {
                    tracing::warn!(key, %err, "undecodable fresh entry, treating as miss");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Push the result onto every queue registered before this drain
    ///
    /// A failed push only costs that follower its wakeup: it will time out
    /// and fall back to the stale entry the leader just wrote.
    async fn notify_waiters(&self, key: &str, payload: &[u8]) {
        let list_key = waiters_key(key);
        let mut notified = 0u32;
        loop {
            match self.store.rpop(&list_key).await {
                Ok(Some(queue)) => {
                    let queue_key = String::from_utf8_lossy(&queue).into_owned();
                    match self.store.lpush(&queue_key, payload).await {
                        Ok(()) => notified += 1,
                        Err(err) => {
                            tracing::warn!(key, queue = %queue_key, %err, "waiter notification failed");
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(key, %err, "waiter drain failed");
                    break;
                }
            }
        }
        if let Err(err) = self.store.del(&[list_key.as_str()]).await {
            tracing::debug!(key, %err, "waiters list cleanup failed");
        }
        tracing::debug!(key, notified, "waiters drained");
    }

    /// Last resort: serve the stale entry when one exists
    async fn fallback(&self, key: &str) -> Result<Value> {
        match self.store.get(&stale_key(key)).await? {
            Some(payload) => serde_json::from_slice(&payload)
                .map_err(|e| RateError::Serialization(e.to_string())),
            None => Err(RateError::Unavailable),
        }
    }
}
