use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;

/// 进程内的小型 TTL 缓存，多请求并发读写安全
///
/// 整张表共享一个刷新时间：过期后下一次读取会整体失效。
pub struct TtlCache<K, V> {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    inner: RwLock<Snapshot<K, V>>,
}

struct Snapshot<K, V> {
    values: HashMap<K, V>,
    loaded_at: Option<DateTime<Utc>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            inner: RwLock::new(Snapshot {
                values: HashMap::new(),
                loaded_at: None,
            }),
        }
    }

    fn is_fresh(&self, loaded_at: Option<DateTime<Utc>>) -> bool {
        loaded_at.is_some_and(|at| self.clock.now() - at < self.ttl)
    }

    /// 缓存新鲜时返回 Some(值是否存在)，过期时返回 None
    pub fn get(&self, key: &K) -> Option<Option<V>> {
        let snapshot = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if !self.is_fresh(snapshot.loaded_at) {
            return None;
        }
        Some(snapshot.values.get(key).cloned())
    }

    /// 整体替换缓存内容
    pub fn replace(&self, values: HashMap<K, V>) {
        let mut snapshot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        snapshot.values = values;
        snapshot.loaded_at = Some(self.clock.now());
    }

    /// 配置变更后调用
    pub fn invalidate(&self) {
        let mut snapshot = self.inner.write().unwrap_or_else(|e| e.into_inner());
        snapshot.loaded_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn snapshot_goes_stale_after_ttl() {
        let clock = Arc::new(ManualClock::default());
        let cache: TtlCache<String, String> = TtlCache::new(clock.clone(), Duration::minutes(1));
        assert_eq!(cache.get(&"a".to_string()), None);

        cache.replace(HashMap::from([("a".to_string(), "0".to_string())]));
        assert_eq!(cache.get(&"a".to_string()), Some(Some("0".to_string())));
        assert_eq!(cache.get(&"b".to_string()), Some(None));

        clock.advance(Duration::seconds(61));
        assert_eq!(cache.get(&"a".to_string()), None);
    }

    #[test]
    fn invalidate_forces_reload() {
        let clock = Arc::new(ManualClock::default());
        let cache: TtlCache<&str, bool> = TtlCache::new(clock, Duration::minutes(1));
        cache.replace(HashMap::from([("x", true)]));
        cache.invalidate();
        assert_eq!(cache.get(&"x"), None);
    }
}
