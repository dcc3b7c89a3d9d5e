use std::convert::Infallible;
use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, FromRequestParts, OriginalUri};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use serde::{Deserialize, Serialize};

/// 统一响应结构
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn message_to_api_response(msg: &str) -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        code: error_codes::SUCCESS,
        msg: msg.into(),
        resp_data: None,
    })
}

/// 请求的完整路径，嵌套路由里 `uri()` 已去掉挂载前缀
pub fn original_path<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

/// 客户端 IP：优先 x-real-ip，其次 x-forwarded-for 第一个非空地址，最后降级为连接地址
pub fn client_ip<B>(req: &Request<B>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());
    ip_from_headers(req.headers(), remote_ip.as_deref())
}

pub fn ip_from_headers(headers: &HeaderMap, remote_ip: Option<&str>) -> String {
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip)
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// 请求来源信息，登录审计使用
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // 测试或未开启 connect_info 时没有连接地址
        let remote_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        Ok(Self {
            ip: ip_from_headers(&parts.headers, remote_ip.as_deref()),
            user_agent: user_agent(&parts.headers),
        })
    }
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const INVALID_CREDENTIALS: i32 = 1001;
    pub const ACCOUNT_DISABLED: i32 = 1002;
    pub const INVALID_TOKEN: i32 = 1005;
    pub const INVALID_TOTP_CODE: i32 = 1007;
    pub const ACCOUNT_LOCKED: i32 = 1011;
    pub const UNAUTHENTICATED: i32 = 1401;
    pub const CONFLICT: i32 = 3001;
    pub const PERMISSION_DENIED: i32 = 4003;
    pub const NOT_FOUND: i32 = 4004;
    pub const RATE_LIMIT: i32 = 4029;
    pub const INTERNAL_ERROR: i32 = 5000;
}
