use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{AppState, auth::AuthContext, error::AppError, utils::original_path};

/// 按请求方法和路径自动校验 API 权限
///
/// 没有登记或没有匹配到的接口默认放行，`API_PERMISSION_FAIL_CLOSED=true` 时拒绝
/// （登录相关的 `/auth/*` 接口除外）。
pub async fn api_permission_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| AppError::Unauthenticated("请先登录".into()))?;

    if ctx.is_super_admin() {
        return Ok(next.run(req).await);
    }

    // 权限表登记的是完整路径
    let path = original_path(&req);
    let method = req.method().as_str().to_string();

    match state.api_table.find(&method, &path).await? {
        Some(permission) => {
            if !state
                .permissions
                .has_permission(ctx.user_id(), &permission.code)
                .await?
            {
                tracing::info!(
                    user_id = ctx.user_id(),
                    %method,
                    %path,
                    code = %permission.code,
                    "api permission denied"
                );
                return Err(AppError::missing_permission(&permission.code));
            }
        }
        None => {
            let auth_prefix = format!("{}/auth/", state.config.api_base_uri.trim_end_matches('/'));
            if state.config.api_permission_fail_closed && !path.starts_with(&auth_prefix) {
                tracing::info!(user_id = ctx.user_id(), %method, %path, "unregistered api denied");
                return Err(AppError::forbidden("接口未登记权限，禁止访问"));
            }
        }
    }

    Ok(next.run(req).await)
}
