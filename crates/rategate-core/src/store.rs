//! Store capability trait

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Primitive operations the cache engine needs from a shared key-value store
///
/// This is the only cross-process shared surface: every mutation of shared
/// state goes through these primitives. Implementations include the Redis
/// client and a deterministic in-memory fake for tests.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Get the value at `key`
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set `key` to `value` with expiry `ttl`
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Set `key` to `value` with expiry `ttl` only if the key is absent
    ///
    /// Returns `true` when the key was set, `false` on conflict.
    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Delete the given keys; missing keys are ignored
    async fn del(&self, keys: &[&str]) -> Result<()>;

    /// Push `value` onto the head of the list at `key`
    async fn lpush(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Pop a value from the tail of the list at `key`
    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Pop a value from the tail of the list at `key`, blocking up to `timeout`
    ///
    /// Returns `None` when the timeout elapses without an element arriving.
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Reset the TTL of `key` to `ttl` iff its current value equals `expected`
    ///
    /// Runs server-side as a single atomic step, never as a read-modify-write
    /// round trip. Returns `false` when the key is absent or holds another
    /// value.
    async fn extend_if_value(&self, key: &str, expected: &[u8], ttl: Duration) -> Result<bool>;

    /// Delete `key` iff its current value equals `expected`
    ///
    /// Runs server-side as a single atomic step. Returns `false` when the key
    /// is absent or holds another value.
    async fn del_if_value(&self, key: &str, expected: &[u8]) -> Result<bool>;
}
