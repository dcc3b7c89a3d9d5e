// 缓存模块
// 登录失败计数、登录锁定、令牌黑名单、权限码缓存、限流计数都保存在这里

pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod ttl;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCache;
pub use redis_store::RedisCache;
pub use ttl::TtlCache;

/// 缓存操作错误
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 带过期时间的键值存储
///
/// 所有临时状态都依赖存储自身的 TTL 过期，不需要额外清理。
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// 自增计数，首次写入时设置过期时间，返回自增后的值
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// 剩余存活时间，键不存在或没有过期时间时返回 None
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}

/// 读取 JSON 缓存
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match store.get(key).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// 写入 JSON 缓存
pub async fn set_json<T: serde::Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let json = serde_json::to_string(value)?;
    store.set_ex(key, &json, ttl).await
}
