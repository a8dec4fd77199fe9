//! Deterministic in-memory `KvStore`

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;

use rategate_core::{KvStore, Result};

#[derive(Debug, Clone)]
struct ValueEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl ValueEntry {
    fn new(data: &[u8], ttl: Duration) -> Self {
        Self {
            data: data.to_vec(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory `KvStore` with real TTL and blocking-pop semantics
///
/// Cloning creates a new handle to the SAME underlying store, so clones
/// behave like separate clients of one shared server.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<DashMap<String, ValueEntry>>,
    lists: Arc<DashMap<String, VecDeque<Vec<u8>>>>,
    signals: Arc<DashMap<String, Arc<Notify>>>,
}

impl MemoryStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn signal(&self, key: &str) -> Arc<Notify> {
        self.signals.entry(key.to_string()).or_default().clone()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let expired = match self.values.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.values.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.values
            .insert(key.to_string(), ValueEntry::new(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        match self.values.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(ValueEntry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(ValueEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn del(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.values.remove(*key);
            self.lists.remove(*key);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_vec());
        self.signal(key).notify_one();
        Ok(())
    }

    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lists.get_mut(key).and_then(|mut list| list.pop_back()))
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.rpop(key).await? {
                return Ok(Some(value));
            }
            // Fetch the signal after the failed pop: a push landing in
            // between leaves a stored permit, so the wait below returns
            // immediately and the next pop sees the element.
            let signal = self.signal(key);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, signal.notified())
                .await
                .is_err()
            {
                // Deadline hit; one last pop in case the push raced the timer
                return self.rpop(key).await;
            }
        }
    }

    async fn extend_if_value(&self, key: &str, expected: &[u8], ttl: Duration) -> Result<bool> {
        match self.values.get_mut(key) {
            Some(mut entry) if !entry.is_expired() && entry.data == expected => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn del_if_value(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let removed = self
            .values
            .remove_if(key, |_, entry| !entry.is_expired() && entry.data == expected);
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .set("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("k", b"v", Duration::from_millis(30))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx_conflict() {
        let store = MemoryStore::new();
        assert!(
            store
                .set_nx("k", b"first", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_nx("k", b"second", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(store.get("k").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_set_nx_after_expiry() {
        let store = MemoryStore::new();
        assert!(
            store
                .set_nx("k", b"first", Duration::from_millis(30))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(
            store
                .set_nx("k", b"second", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert_eq!(store.get("k").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_list_order_is_fifo() {
        let store = MemoryStore::new();
        store.lpush("q", b"a").await.unwrap();
        store.lpush("q", b"b").await.unwrap();
        // Head-push, tail-pop: first in, first out
        assert_eq!(store.rpop("q").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.rpop("q").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.rpop("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_brpop_times_out_empty() {
        let store = MemoryStore::new();
        let popped = store
            .brpop("q", Duration::from_millis(40))
            .await
            .unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_brpop_wakes_on_push() {
        let store = MemoryStore::new();
        let pusher = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.lpush("q", b"payload").await.unwrap();
        });
        let popped = store.brpop("q", Duration::from_secs(2)).await.unwrap();
        assert_eq!(popped, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn test_brpop_sees_existing_element() {
        let store = MemoryStore::new();
        store.lpush("q", b"early").await.unwrap();
        let popped = store.brpop("q", Duration::from_secs(2)).await.unwrap();
        assert_eq!(popped, Some(b"early".to_vec()));
    }

    #[tokio::test]
    async fn test_extend_if_value_checks_token() {
        let store = MemoryStore::new();
        store
            .set("lock", b"token", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(
            store
                .extend_if_value("lock", b"token", Duration::from_secs(60))
                .await
                .unwrap()
        );
        assert!(
            !store
                .extend_if_value("lock", b"other", Duration::from_secs(60))
                .await
                .unwrap()
        );
        // The extension reset the TTL well past the original 50ms
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("lock").await.unwrap(), Some(b"token".to_vec()));
    }

    #[tokio::test]
    async fn test_del_if_value_checks_token() {
        let store = MemoryStore::new();
        store
            .set("lock", b"token", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(!store.del_if_value("lock", b"other").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), Some(b"token".to_vec()));
        assert!(store.del_if_value("lock", b"token").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), None);
        // Deleting again is a no-op
        assert!(!store.del_if_value("lock", b"token").await.unwrap());
    }
}
