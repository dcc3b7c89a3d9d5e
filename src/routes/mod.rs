use std::sync::Arc;

use axum::{Router, middleware::from_fn, middleware::from_fn_with_state};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::middleware::{
    RateLimiter, api_permission_middleware, auth_middleware, data_scope_middleware, log_errors,
    operation_log_middleware, rate_limit,
};

pub mod admin;
pub mod auth;
pub mod department;
pub mod role;
pub mod user;

/// 组装全部路由
///
/// 受保护的路由依次经过认证、操作日志、API 权限、数据范围；限流在最外层，按完整路径计数。
pub fn router(state: AppState) -> Router {
    let gate = ServiceBuilder::new()
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn_with_state(state.clone(), operation_log_middleware))
        .layer(from_fn_with_state(state.clone(), api_permission_middleware))
        .layer(from_fn_with_state(state.clone(), data_scope_middleware));

    let protected = Router::new()
        .merge(auth::protected_routes())
        .merge(user::routes())
        .merge(role::routes())
        .merge(admin::routes())
        .merge(department::routes())
        .layer(gate);

    let api = Router::new().merge(auth::public_routes()).merge(protected);

    let limiter = Arc::new(RateLimiter::new(state.cache.clone(), state.config.clone()));

    Router::new()
        .nest(&state.config.api_base_uri, api)
        .layer(from_fn(log_errors))
        .layer(from_fn_with_state(limiter, rate_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
