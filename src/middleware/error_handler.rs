use axum::{
    body::{Body, to_bytes},
    http::{Request, header::CONTENT_LENGTH},
    middleware::Next,
    response::Response,
};
use tracing::error;

/// 5xx 响应体最多记录的字节数
const MAX_LOGGED_BODY: usize = 4096;

/// 记录所有服务端错误的响应内容
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if !response.status().is_server_error() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(%method, %path, status = %parts.status, "failed to read error body: {}", e);
            parts.headers.remove(CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    error!(
        %method,
        %path,
        status = %parts.status,
        body = %String::from_utf8_lossy(&bytes),
        "server error"
    );

    // body 已被读出，重新构建响应
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
