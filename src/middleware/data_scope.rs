use axum::{
    body::Body, extract::State, http::Request, middleware::Next, response::Response,
};

use crate::{AppState, auth::AuthContext, error::AppError};

/// 计算数据范围并写回请求上下文，供下游查询使用
pub async fn data_scope_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(ctx) = req.extensions_mut().get_mut::<AuthContext>() else {
        return Err(AppError::Unauthenticated("请先登录".into()));
    };

    let filter = state
        .data_scope
        .resolve(
            ctx.user_id(),
            ctx.tenant_id(),
            ctx.department_id,
            ctx.role_level,
        )
        .await?;
    ctx.data_scope = Some(filter);

    Ok(next.run(req).await)
}
