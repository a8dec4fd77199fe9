//! Follower wait channel

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use rategate_core::{KvStore, RateError, Result, TimeoutKind};

/// Key of the list of registered follower queues for a cache key
pub fn waiters_key(key: &str) -> String {
    format!("waiters:{key}")
}

/// One follower's registration for a leader's result
///
/// Registering pushes the name of a private queue onto the shared waiters
/// list for the key; the leader drains that list and pushes the serialized
/// result onto each registered queue. Registration can race the leader's
/// drain: a follower registered too late simply times out and falls back.
pub struct Waiter<S> {
    store: Arc<S>,
    queue_key: String,
    timeout: Duration,
}

impl<S: KvStore> Waiter<S> {
    /// Register a fresh private queue under the waiters list for `key`
    pub async fn register(store: Arc<S>, key: &str, timeout: Duration) -> Result<Self> {
        let queue_key = format!("waiter:{key}:{}", Uuid::new_v4());
        store.lpush(&waiters_key(key), queue_key.as_bytes()).await?;
        tracing::debug!(key, queue = %queue_key, "follower registered");
        Ok(Self {
            store,
            queue_key,
            timeout,
        })
    }

    /// Block until the leader publishes a result or the timeout elapses
    ///
    /// A malformed payload is a hard error; the queue is not retried. The
    /// private queue is deleted on every exit path.
    pub async fn wait(self) -> Result<serde_json::Value> {
        let popped = self.store.brpop(&self.queue_key, self.timeout).await;
        if let Err(err) = self.store.del(&[self.queue_key.as_str()]).await {
            tracing::debug!(queue = %self.queue_key, %err, "waiter queue cleanup failed");
        }
        match popped? {
            Some(payload) => serde_json::from_slice(&payload)
                .map_err(|e| RateError::Serialization(e.to_string())),
            None => Err(RateError::Timeout(TimeoutKind::FollowerWait)),
        }
    }
}
