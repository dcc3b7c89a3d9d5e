#![allow(dead_code)]

use std::sync::{Arc, LazyLock};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use cms_backend::{
    AppState,
    cache::MemoryCache,
    clock::ManualClock,
    config::Config,
    models::{AdminTier, DataScope, Role, RoleDraft, User},
    notify::LogNotifier,
    repository::{MemoryRepository, RoleStore},
    routes,
};
use serde_json::Value;
use tower::ServiceExt;

pub const PASSWORD: &str = "secret123";
const JWT_SECRET: &str = "integration-test-secret";

/// 低成本的 bcrypt 哈希，加快测试
pub static PASSWORD_HASH: LazyLock<String> =
    LazyLock::new(|| bcrypt::hash(PASSWORD, 4).expect("hash password"));

/// 审计日志在后台任务里写入，轮询等待
pub async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("background write did not happen in time");
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    pub cache: Arc<MemoryCache>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::for_tests(JWT_SECRET))
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::default());
        let repo = Arc::new(MemoryRepository::new(clock.clone()));
        let cache = Arc::new(MemoryCache::new(clock.clone()));
        let state = AppState::new(
            config,
            repo.clone(),
            cache.clone(),
            clock.clone(),
            Arc::new(LogNotifier),
        );
        Self {
            router: routes::router(state.clone()),
            state,
            repo,
            cache,
            clock,
        }
    }

    pub fn seed_user(&self, tenant_id: i64, username: &str, tier: AdminTier) -> User {
        self.repo
            .seed_user(tenant_id, username, &PASSWORD_HASH, tier)
    }

    pub async fn seed_role(&self, tenant_id: i64, code: &str, data_scope: DataScope) -> Role {
        self.repo
            .create_role(RoleDraft {
                tenant_id,
                name: code.to_string(),
                code: code.to_string(),
                status: 1,
                sort: 0,
                data_scope,
                remark: String::new(),
            })
            .await
            .expect("create role")
    }

    pub async fn grant_roles(&self, user_id: i64, role_ids: &[i64]) {
        self.repo
            .replace_user_roles(user_id, role_ids)
            .await
            .expect("grant roles");
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(serde_json::json!({ "username": username, "password": password })),
        )
        .await
    }

    /// 登录并返回会话令牌
    pub async fn token_for(&self, username: &str) -> String {
        let (status, body) = self.login(username, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["resp_data"]["token"]
            .as_str()
            .expect("session token")
            .to_string()
    }
}
