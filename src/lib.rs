use std::sync::Arc;

use auth::{
    ApiPermissionTable, AuditLogger, DataScopeResolver, LoginGuard, LoginService,
    PermissionResolver, TokenDenylist, TokenService,
};
use cache::KvStore;
use clock::Clock;
use config::Config;
use notify::Notifier;
use repository::Repository;

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod repository;
pub mod routes;
pub mod utils;

/// 请求间共享的依赖，全部在启动时注入
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repo: Arc<dyn Repository>,
    pub cache: Arc<dyn KvStore>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub tokens: Arc<TokenService>,
    pub denylist: Arc<TokenDenylist>,
    pub permissions: Arc<PermissionResolver>,
    pub api_table: Arc<ApiPermissionTable>,
    pub data_scope: Arc<DataScopeResolver>,
    pub login_guard: Arc<LoginGuard>,
    pub audit: Arc<AuditLogger>,
    pub login: Arc<LoginService>,
}

impl AppState {
    pub fn new(
        config: Config,
        repo: Arc<dyn Repository>,
        cache: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenService::new(
            &config.jwt_secret,
            config.jwt_expiration(),
            config.challenge_token_expiration(),
        ));
        let denylist = Arc::new(TokenDenylist::new(cache.clone()));
        let permissions = Arc::new(PermissionResolver::new(
            repo.clone(),
            cache.clone(),
            config.permission_cache_ttl(),
        ));
        let api_table = Arc::new(ApiPermissionTable::new(
            repo.clone(),
            clock.clone(),
            chrono::Duration::from_std(config.permission_cache_ttl())
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        ));
        let data_scope = Arc::new(DataScopeResolver::new(repo.clone()));
        let login_guard = Arc::new(LoginGuard::new(
            cache.clone(),
            config.login_max_attempts,
            config.login_lock_duration(),
        ));
        let audit = Arc::new(AuditLogger::new(repo.clone(), clock.clone()));
        let login = Arc::new(LoginService::new(
            config.clone(),
            repo.clone(),
            cache.clone(),
            clock.clone(),
            tokens.clone(),
            login_guard.clone(),
            denylist.clone(),
            audit.clone(),
            notifier.clone(),
        ));

        Self {
            config,
            repo,
            cache,
            clock,
            notifier,
            tokens,
            denylist,
            permissions,
            api_table,
            data_scope,
            login_guard,
            audit,
            login,
        }
    }
}
