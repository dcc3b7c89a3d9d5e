use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{
    cache::{KvStore, keys},
    config::Config,
    error::AppError,
    utils::client_ip,
};

/// 单独限流的敏感接口（相对 API 前缀）
const STRICT_PATHS: [&str; 4] = [
    "/auth/login",
    "/auth/verify-totp",
    "/auth/forgot-password",
    "/auth/reset-password",
];

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    config: Arc<Config>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    fn is_strict(&self, path: &str) -> bool {
        let base = self.config.api_base_uri.trim_end_matches('/');
        path.strip_prefix(base)
            .is_some_and(|rest| STRICT_PATHS.contains(&rest))
    }

    /// 固定窗口计数：INCR，首次写入时设置过期时间
    async fn hit(&self, key: &str, limit: u32) -> Result<(), AppError> {
        let window = self.config.rate_limit_window();
        let count = self.store.incr_with_ttl(key, window).await?;
        if count > i64::from(limit) {
            return Err(AppError::RateLimited {
                retry_after_secs: window.as_secs(),
            });
        }
        Ok(())
    }

    pub async fn check_rate_limit(
        self: Arc<Self>,
        req: Request<Body>,
        next: Next,
    ) -> Result<Response, AppError> {
        let ip = client_ip(&req);
        let path = req.uri().path().to_string();

        if let Err(e) = self
            .hit(&keys::global_rate_limit_key(&ip), self.config.rate_limit_requests)
            .await
        {
            tracing::warn!(%ip, %path, "global rate limit exceeded");
            return Err(e);
        }

        if self.is_strict(&path) {
            if let Err(e) = self
                .hit(
                    &keys::route_rate_limit_key(&path, &ip),
                    self.config.login_rate_limit,
                )
                .await
            {
                tracing::warn!(%ip, %path, "login rate limit exceeded");
                return Err(e);
            }
        }

        Ok(next.run(req).await)
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    limiter.check_rate_limit(req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;

    fn limiter() -> RateLimiter {
        let mut config = Config::for_tests("0123456789abcdef");
        config.login_rate_limit = 2;
        RateLimiter::new(
            Arc::new(MemoryCache::new(Arc::new(ManualClock::default()))),
            Arc::new(config),
        )
    }

    #[test]
    fn strict_paths_are_relative_to_api_base() {
        let limiter = limiter();
        assert!(limiter.is_strict("/api/auth/login"));
        assert!(limiter.is_strict("/api/auth/reset-password"));
        assert!(!limiter.is_strict("/api/auth/user-info"));
        assert!(!limiter.is_strict("/auth/login"));
    }

    #[tokio::test]
    async fn window_counter_rejects_over_limit() {
        let limiter = limiter();
        assert!(limiter.hit("k", 2).await.is_ok());
        assert!(limiter.hit("k", 2).await.is_ok());
        assert!(matches!(
            limiter.hit("k", 2).await,
            Err(AppError::RateLimited { retry_after_secs: 60 })
        ));
    }
}
