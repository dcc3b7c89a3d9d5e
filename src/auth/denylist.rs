use std::sync::Arc;
use std::time::Duration;

use crate::cache::{KvStore, keys};
use crate::error::AppError;

/// 已吊销令牌的黑名单，条目随 TTL 自动过期
pub struct TokenDenylist {
    store: Arc<dyn KvStore>,
}

impl TokenDenylist {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), AppError> {
        self.store
            .set_ex(&keys::token_blacklist_key(token), "1", ttl)
            .await?;
        Ok(())
    }

    pub async fn is_revoked(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.store.exists(&keys::token_blacklist_key(token)).await?)
    }
}
