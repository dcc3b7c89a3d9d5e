use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};

use super::{CacheError, KvStore};

/// Redis 实现
#[derive(Clone)]
pub struct RedisCache {
    redis: Arc<RedisClient>,
}

impl RedisCache {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.redis.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl KvStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let mut conn = self.conn().await?;
        let count: i64 = conn.incr(key, 1).await?;

        if count == 1 {
            // 第一次写入时设置过期时间
            let _: () = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        }

        Ok(count)
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn().await?;
        // -2 表示键不存在，-1 表示没有过期时间
        let secs: i64 = conn.ttl(key).await?;
        if secs <= 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_secs(secs as u64)))
    }
}
