use axum::{
    Router,
    routing::{get, post, put},
};

use crate::AppState;

mod handler;
mod model;

pub use handler::{
    bind_totp, change_password, disable_totp, forgot_password, generate_totp, login,
    login_history, logout, permission_codes, refresh_token, reset_password, user_info,
    verify_totp,
};

/// 无需登录的认证接口
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/verify-totp", post(verify_totp))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/user-info", get(user_info))
        .route("/auth/codes", get(permission_codes))
        .route("/auth/login-history", get(login_history))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/password", put(change_password))
        .route("/auth/totp/generate", post(generate_totp))
        .route("/auth/totp/bind", post(bind_totp))
        .route("/auth/totp/disable", post(disable_totp))
}
