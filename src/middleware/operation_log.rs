use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::auth::{AuthContext, OperationAuditEntry};
use crate::utils::{client_ip, original_path, user_agent};

/// 记录受保护接口上的写操作，被拒绝的请求也会记下响应状态
///
/// 读请求不记录；是否记录由 `log_operation_enabled` 配置决定，写入在后台完成。
pub async fn operation_log_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }
    let Some(ctx) = req.extensions().get::<AuthContext>().cloned() else {
        return next.run(req).await;
    };

    let method = req.method().to_string();
    let path = original_path(&req);
    let ip = client_ip(&req);
    let user_agent = user_agent(req.headers());
    let started = Instant::now();

    let response = next.run(req).await;

    state.audit.record_operation(OperationAuditEntry {
        tenant_id: ctx.tenant_id(),
        user_id: ctx.user_id(),
        method,
        path,
        status: response.status().as_u16(),
        ip,
        user_agent,
        duration_ms: started.elapsed().as_millis() as i64,
    });
    response
}
