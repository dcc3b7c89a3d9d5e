use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CacheError, KvStore};
use crate::clock::Clock;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// 进程内实现，过期时间以注入的时钟为准
///
/// 用于测试和单机开发环境。
pub struct MemoryCache {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn expiry(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        Some(self.clock.now() + ttl)
    }

    /// 清理已过期的条目
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    fn live_entry(&self, key: &str) -> Option<Entry> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).filter(|e| e.is_live(now)).cloned()
    }
}

#[async_trait]
impl KvStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live_entry(key).map(|e| e.value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: self.expiry(ttl),
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = self.clock.now();
        let expires_at = self.expiry(ttl);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        let next = match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
                entry.value = count.to_string();
                count
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at,
                    },
                );
                1
            }
        };

        Ok(next)
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.live_entry(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = self.clock.now();
        Ok(self
            .live_entry(key)
            .and_then(|e| e.expires_at)
            .and_then(|at| (at - now).to_std().ok()))
    }
}
