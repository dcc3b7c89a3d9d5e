use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::{KvStore, keys};
use crate::error::AppError;

/// 按用户名计数的登录失败锁定
///
/// 状态：未锁定 →（连续失败达到上限）→ 锁定 →（锁定到期或手动解锁）→ 未锁定
pub struct LoginGuard {
    store: Arc<dyn KvStore>,
    max_attempts: u32,
    lock_duration: Duration,
}

impl LoginGuard {
    pub fn new(store: Arc<dyn KvStore>, max_attempts: u32, lock_duration: Duration) -> Self {
        Self {
            store,
            max_attempts,
            lock_duration,
        }
    }

    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    /// 记录一次失败，返回 (剩余次数, 是否已锁定)
    ///
    /// 已锁定时不再改动任何状态。
    pub async fn record_failure(&self, username: &str) -> Result<(u32, bool), AppError> {
        let lock_key = keys::login_lock_key(username);
        if self.store.exists(&lock_key).await? {
            return Ok((0, true));
        }

        let fail_key = keys::login_fail_key(username);
        let count = self
            .store
            .incr_with_ttl(&fail_key, self.lock_duration)
            .await?;
        let count = u32::try_from(count).unwrap_or(u32::MAX);

        if count >= self.max_attempts {
            self.store.set_ex(&lock_key, "1", self.lock_duration).await?;
            self.store.del(&fail_key).await?;
            warn!(username, attempts = count, "account locked after repeated failures");
            return Ok((0, true));
        }

        Ok((self.max_attempts - count, false))
    }

    /// 返回 (是否锁定, 剩余秒数)
    pub async fn is_locked(&self, username: &str) -> Result<(bool, i64), AppError> {
        let lock_key = keys::login_lock_key(username);
        if !self.store.exists(&lock_key).await? {
            return Ok((false, 0));
        }
        let remaining = self
            .store
            .ttl(&lock_key)
            .await?
            .map(|d| d.as_secs().max(1) as i64)
            .unwrap_or(self.lock_duration.as_secs() as i64);
        Ok((true, remaining))
    }

    /// 登录成功后清除失败计数和锁定
    pub async fn clear_failures(&self, username: &str) -> Result<(), AppError> {
        self.store.del(&keys::login_fail_key(username)).await?;
        self.store.del(&keys::login_lock_key(username)).await?;
        Ok(())
    }

    /// 管理员手动解锁
    pub async fn unlock(&self, username: &str) -> Result<(), AppError> {
        self.clear_failures(username).await?;
        info!(username, "login lock cleared manually");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;

    fn guard(clock: Arc<ManualClock>) -> LoginGuard {
        LoginGuard::new(
            Arc::new(MemoryCache::new(clock)),
            5,
            Duration::from_secs(15 * 60),
        )
    }

    #[tokio::test]
    async fn fifth_failure_locks() {
        let clock = Arc::new(ManualClock::default());
        let guard = guard(clock.clone());

        for expected in (1..=4).rev() {
            assert_eq!(guard.record_failure("carol").await.unwrap(), (expected, false));
        }
        assert_eq!(guard.is_locked("carol").await.unwrap(), (false, 0));
        assert_eq!(guard.record_failure("carol").await.unwrap(), (0, true));

        let (locked, remaining) = guard.is_locked("carol").await.unwrap();
        assert!(locked);
        assert!(remaining > 0 && remaining <= 900);
    }

    #[tokio::test]
    async fn failures_while_locked_do_not_extend_the_lock() {
        let clock = Arc::new(ManualClock::default());
        let guard = guard(clock.clone());
        for _ in 0..5 {
            guard.record_failure("carol").await.unwrap();
        }

        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(guard.record_failure("carol").await.unwrap(), (0, true));
        let (_, remaining) = guard.is_locked("carol").await.unwrap();
        assert!(remaining <= 5 * 60);

        clock.advance(chrono::Duration::minutes(6));
        assert_eq!(guard.is_locked("carol").await.unwrap(), (false, 0));
        assert_eq!(guard.record_failure("carol").await.unwrap(), (4, false));
    }

    #[tokio::test]
    async fn unlock_resets_state() {
        let clock = Arc::new(ManualClock::default());
        let guard = guard(clock);
        for _ in 0..5 {
            guard.record_failure("dave").await.unwrap();
        }
        guard.unlock("dave").await.unwrap();
        assert_eq!(guard.is_locked("dave").await.unwrap(), (false, 0));
        assert_eq!(guard.record_failure("dave").await.unwrap(), (4, false));
    }

    #[tokio::test]
    async fn counters_are_per_username() {
        let clock = Arc::new(ManualClock::default());
        let guard = guard(clock);
        guard.record_failure("erin").await.unwrap();
        assert_eq!(guard.record_failure("frank").await.unwrap(), (4, false));
    }
}
