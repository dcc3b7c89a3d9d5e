use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::cache::CacheError;
use crate::utils::{ApiResponse, error_codes};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 未登录、令牌缺失或已被吊销
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// 令牌签名错误、过期或类型不符
    #[error("invalid token")]
    InvalidToken,

    /// 已登录但缺少权限，能确定缺失的权限码时一并返回
    #[error("forbidden: {message}")]
    Forbidden {
        permission: Option<String>,
        message: String,
    },

    #[error("account locked: {message}")]
    AccountLocked {
        remaining_secs: Option<i64>,
        message: String,
    },

    #[error("account disabled")]
    AccountDisabled,

    #[error("invalid credentials")]
    InvalidCredentials { remaining_attempts: u32 },

    #[error("invalid one-time code")]
    InvalidTotpCode,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden {
            permission: None,
            message: message.into(),
        }
    }

    pub fn missing_permission(code: &str) -> Self {
        AppError::Forbidden {
            permission: Some(code.to_string()),
            message: format!("无操作权限: {}", code),
        }
    }

    fn parts(&self) -> (StatusCode, i32, String, Option<serde_json::Value>) {
        match self {
            AppError::Unauthenticated(msg) => (
                StatusCode::UNAUTHORIZED,
                error_codes::UNAUTHENTICATED,
                msg.clone(),
                None,
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                error_codes::INVALID_TOKEN,
                "token无效或已过期".into(),
                None,
            ),
            AppError::Forbidden {
                permission,
                message,
            } => (
                StatusCode::FORBIDDEN,
                error_codes::PERMISSION_DENIED,
                message.clone(),
                permission.as_ref().map(|p| json!({ "permission": p })),
            ),
            AppError::AccountLocked {
                remaining_secs,
                message,
            } => (
                StatusCode::LOCKED,
                error_codes::ACCOUNT_LOCKED,
                message.clone(),
                remaining_secs.map(|secs| json!({ "remaining_secs": secs })),
            ),
            AppError::AccountDisabled => (
                StatusCode::FORBIDDEN,
                error_codes::ACCOUNT_DISABLED,
                "用户已被禁用".into(),
                None,
            ),
            AppError::InvalidCredentials { remaining_attempts } => (
                StatusCode::UNAUTHORIZED,
                error_codes::INVALID_CREDENTIALS,
                format!("用户名或密码错误，还可尝试{}次", remaining_attempts),
                Some(json!({ "remaining_attempts": remaining_attempts })),
            ),
            AppError::InvalidTotpCode => (
                StatusCode::UNAUTHORIZED,
                error_codes::INVALID_TOTP_CODE,
                "验证码错误".into(),
                None,
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                msg.clone(),
                None,
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                error_codes::CONFLICT,
                msg.clone(),
                None,
            ),
            AppError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                error_codes::RATE_LIMIT,
                format!("请求过于频繁，请在{}秒后重试", retry_after_secs),
                None,
            ),
            // 内部错误细节只进日志，不返回给客户端
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "内部服务器错误".into(),
                None,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal error");
        }

        let (status, code, msg, resp_data) = self.parts();
        let body = Json(ApiResponse {
            code,
            msg,
            resp_data,
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(format!("database: {}", e))
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        AppError::Internal(format!("cache: {}", e))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("bcrypt: {}", e))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AppError::Internal(format!("jwt: {}", e))
    }
}
