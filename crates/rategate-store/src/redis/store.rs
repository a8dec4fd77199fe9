//! Redis `KvStore` implementation

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;

use rategate_core::{KvStore, RateError, Result};

use super::config::RedisConfig;

/// Refresh the TTL of a key iff it still holds the expected value
const EXTEND_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('expire', KEYS[1], ARGV[2])
else
  return 0
end
";

/// Delete a key iff it still holds the expected value
const DELETE_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
  return redis.call('del', KEYS[1])
else
  return 0
end
";

/// Redis-backed `KvStore`
///
/// The compare-and-act primitives run as server-side Lua scripts so the
/// value check and the mutation are one atomic step.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
    extend_script: redis::Script,
    delete_script: redis::Script,
}

impl RedisStore {
    /// Connect a pooled Redis client
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| RateError::Store(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| RateError::Store(e.to_string()))?;

        Ok(Self {
            pool,
            extend_script: redis::Script::new(EXTEND_SCRIPT),
            delete_script: redis::Script::new(DELETE_SCRIPT),
        })
    }

    async fn conn(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| RateError::Store(e.to_string()))
    }
}

fn store_err(err: redis::RedisError) -> RateError {
    RateError::Store(err.to_string())
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(store_err)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        // SET .. NX replies nil on conflict
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .arg("NX")
            .query_async(&mut *conn)
            .await
            .map_err(store_err)?;
        Ok(reply.is_some())
    }

    async fn del(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let _: usize = conn.del(keys.to_vec()).await.map_err(store_err)?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: usize = conn.lpush(key, value).await.map_err(store_err)?;
        Ok(())
    }

    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.rpop(key, None).await.map_err(store_err)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let reply: Option<(String, Vec<u8>)> = conn
            .brpop(key, timeout.as_secs_f64())
            .await
            .map_err(store_err)?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn extend_if_value(&self, key: &str, expected: &[u8], ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let extended: i64 = self
            .extend_script
            .key(key)
            .arg(expected)
            .arg(ttl.as_secs())
            .invoke_async(&mut *conn)
            .await
            .map_err(store_err)?;
        Ok(extended == 1)
    }

    async fn del_if_value(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = self
            .delete_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await
            .map_err(store_err)?;
        Ok(deleted == 1)
    }
}
