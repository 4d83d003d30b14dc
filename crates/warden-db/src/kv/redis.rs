//! Redis backend on a deadpool connection pool

use async_trait::async_trait;
use deadpool_redis::redis::{cmd, pipe, AsyncCommands};
use deadpool_redis::{Config as RedisConfig, Pool as RedisPool, PoolConfig, Runtime};
use std::future::Future;
use std::time::Duration;

use super::KvStore;
use crate::{DbError, DbResult};

pub struct RedisKvStore {
    pool: RedisPool,
    timeout: Duration,
}

impl RedisKvStore {
    /// Build a pool for `url`. Every call is bounded by `timeout`.
    pub fn connect(url: &str, pool_size: usize, timeout: Duration) -> DbResult<Self> {
        let mut cfg = RedisConfig::from_url(url);
        cfg.pool = Some(PoolConfig::new(pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| DbError::Connection(format!("Redis: {}", e)))?;

        Ok(Self { pool, timeout })
    }

    pub fn from_pool(pool: RedisPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T>(&self, op: impl Future<Output = DbResult<T>>) -> DbResult<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| DbError::Timeout(self.timeout))?
    }
}

/// Redis rejects a zero expiry
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> DbResult<()> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            conn.set_ex::<_, _, ()>(key, value, ttl_secs(ttl)).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> DbResult<bool> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let deleted: i64 = conn.del(key).await?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> DbResult<i64> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            // MULTI/EXEC so the counter never exists without an expiry
            let (count,): (i64,) = pipe()
                .atomic()
                .incr(key, 1)
                .expire(key, ttl_secs(ttl) as i64)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(count)
        })
        .await
    }

    async fn ping(&self) -> DbResult<()> {
        self.bounded(async {
            let mut conn = self.pool.get().await?;
            let _: String = cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}
