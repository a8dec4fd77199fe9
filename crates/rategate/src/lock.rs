//! Fenced, self-renewing distributed lock

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use rategate_core::{KvStore, LockErrorKind, RateError, Result};

/// Tunables for lock leases
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lease duration
    pub ttl: Duration,

    /// Renewal period
    pub extend_every: Duration,

    /// Consecutive transient store errors the renewer tolerates before
    /// declaring the lease lost
    pub extend_error_grace: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            extend_every: Duration::from_secs(2),
            extend_error_grace: 0,
        }
    }
}

/// Key of the lock record for a cache key
fn lock_key(key: &str) -> String {
    format!("lock:{key}")
}

/// Mutual exclusion over a single store key
///
/// Acquisition is one set-if-absent of a random lease token; renewal and
/// release verify the token server-side, so a lease that expired and was
/// taken over can never be extended or deleted by the old holder.
pub struct DistributedLock<S> {
    store: Arc<S>,
    config: LockConfig,
}

impl<S: KvStore> DistributedLock<S> {
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Run `body` while holding the lock for `key`
    ///
    /// Fails fast with `Lock(NotAcquired)` when another holder exists; there
    /// is no retry at this layer. While `body` runs, a background task renews
    /// the lease every `extend_every`; loss of the lease cancels `body` and
    /// returns `Lock(LeaseLost)`. The lock is released on every exit path,
    /// conditional on the token still matching.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let lock_key = lock_key(key);
        let token = Uuid::new_v4().to_string();

        let acquired = self
            .store
            .set_nx(&lock_key, token.as_bytes(), self.config.ttl)
            .await?;
        if !acquired {
            return Err(RateError::Lock(LockErrorKind::NotAcquired));
        }
        tracing::debug!(key, "lock acquired");

        let (loss_tx, mut loss_rx) = oneshot::channel();
        let renewer = self.spawn_renewer(lock_key.clone(), token.clone(), loss_tx);

        let result = tokio::select! {
            result = body() => result,
            _ = &mut loss_rx => Err(RateError::Lock(LockErrorKind::LeaseLost)),
        };

        renewer.abort();
        // Best effort: a failed release is reclaimed by the TTL
        if let Err(err) = self.store.del_if_value(&lock_key, token.as_bytes()).await {
            tracing::warn!(key, %err, "lock release failed");
        }
        tracing::debug!(key, "lock released");
        result
    }

    /// Renewal loop, detached from the body so the body observes no added
    /// suspension points. Uses monotonic time to presume expiry when the
    /// store was unreachable for a whole lease.
    fn spawn_renewer(
        &self,
        lock_key: String,
        token: String,
        loss_tx: oneshot::Sender<()>,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let ttl = self.config.ttl;
        let extend_every = self.config.extend_every;
        let grace = self.config.extend_error_grace;

        tokio::spawn(async move {
            let mut last_extended = Instant::now();
            let mut store_errors = 0u32;
            loop {
                tokio::time::sleep(extend_every).await;

                if last_extended.elapsed() >= ttl {
                    tracing::warn!(key = %lock_key, "lease presumed expired");
                    let _ = loss_tx.send(());
                    return;
                }

                match store.extend_if_value(&lock_key, token.as_bytes(), ttl).await {
                    Ok(true) => {
                        last_extended = Instant::now();
                        store_errors = 0;
                    }
                    Ok(false) => {
                        tracing::warn!(key = %lock_key, "lease taken over");
                        let _ = loss_tx.send(());
                        return;
                    }
                    Err(err) => {
                        store_errors += 1;
                        tracing::warn!(key = %lock_key, %err, "lease extension failed");
                        if store_errors > grace {
                            let _ = loss_tx.send(());
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn lock_with(store: &Arc<MemoryStore>, config: LockConfig) -> DistributedLock<MemoryStore> {
        DistributedLock::new(store.clone(), config)
    }

    #[tokio::test]
    async fn test_with_lock_runs_body() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock_with(&store, LockConfig::default());

        let value = lock.with_lock("k", || async { Ok(41 + 1) }).await.unwrap();
        assert_eq!(value, 42);
        // Released on exit
        assert_eq!(store.get("lock:k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_holder_fails_fast() {
        let store = Arc::new(MemoryStore::new());
        let holder = lock_with(&store, LockConfig::default());
        let contender = lock_with(&store, LockConfig::default());

        let store_inner = store.clone();
        let result = holder
            .with_lock("k", || async move {
                // While held, another process cannot acquire
                let inner = contender.with_lock("k", || async { Ok(()) }).await;
                assert!(matches!(
                    inner,
                    Err(RateError::Lock(LockErrorKind::NotAcquired))
                ));
                assert!(store_inner.get("lock:k").await.unwrap().is_some());
                Ok(())
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_release_allows_reacquisition() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock_with(&store, LockConfig::default());

        lock.with_lock("k", || async { Ok(()) }).await.unwrap();
        lock.with_lock("k", || async { Ok(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn test_body_error_propagates_after_release() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock_with(&store, LockConfig::default());

        let result: Result<()> = lock
            .with_lock("k", || async { Err(RateError::Internal("boom".into())) })
            .await;
        assert!(matches!(result, Err(RateError::Internal(_))));
        assert_eq!(store.get("lock:k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_renewer_keeps_lease_alive() {
        let store = Arc::new(MemoryStore::new());
        let config = LockConfig {
            ttl: Duration::from_millis(120),
            extend_every: Duration::from_millis(30),
            extend_error_grace: 0,
        };
        let lock = lock_with(&store, config.clone());
        let contender = lock_with(&store, config);

        lock.with_lock("k", || async {
            // Body outlives the original lease by 2x; renewals keep it held
            tokio::time::sleep(Duration::from_millis(250)).await;
            let inner = contender.with_lock("k", || async { Ok(()) }).await;
            assert!(matches!(
                inner,
                Err(RateError::Lock(LockErrorKind::NotAcquired))
            ));
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_takeover_signals_lease_loss() {
        let store = Arc::new(MemoryStore::new());
        let config = LockConfig {
            ttl: Duration::from_millis(200),
            extend_every: Duration::from_millis(40),
            extend_error_grace: 0,
        };
        let lock = lock_with(&store, config);

        let thief = store.clone();
        let result: Result<()> = lock
            .with_lock("k", || async move {
                // Simulate expiry plus takeover by another holder
                thief
                    .set("lock:k", b"other-token", Duration::from_secs(60))
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(RateError::Lock(LockErrorKind::LeaseLost))
        ));
        // The foreign lease must not be deleted by our release
        assert_eq!(
            store.get("lock:k").await.unwrap(),
            Some(b"other-token".to_vec())
        );
    }
}
