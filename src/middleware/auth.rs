use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, Header, authorization::Bearer};

use crate::{AppState, auth::AuthContext, error::AppError, models::UserStatus};

/// 从 Authorization 头取出 bearer 令牌
pub fn bearer_token(req: &Request<Body>) -> Option<String> {
    let mut values = req.headers().get_all(AUTHORIZATION).iter();
    Authorization::<Bearer>::decode(&mut values)
        .ok()
        .map(|auth| auth.token().to_string())
}

/// 令牌校验 + 黑名单检查，通过后把 AuthContext 放进请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token =
        bearer_token(&req).ok_or_else(|| AppError::Unauthenticated("请先登录".into()))?;

    let claims = state.tokens.verify_session_token(&token)?;

    // 黑名单必须在信任 claims 之前检查
    if state.denylist.is_revoked(&token).await? {
        return Err(AppError::Unauthenticated("token已失效，请重新登录".into()));
    }

    let user = state
        .repo
        .find_user(claims.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("用户不存在，请重新登录".into()))?;
    match user.status {
        UserStatus::Active => {}
        UserStatus::Disabled => return Err(AppError::AccountDisabled),
        UserStatus::Locked => {
            return Err(AppError::AccountLocked {
                remaining_secs: None,
                message: "账号已被锁定，请联系管理员解锁".into(),
            });
        }
    }

    let role_level = state.permissions.level_of(&user).await?;
    tracing::debug!(
        user_id = claims.user_id,
        tenant_id = claims.tenant_id,
        level = %role_level,
        "authenticated request"
    );

    req.extensions_mut().insert(AuthContext {
        claims,
        token,
        department_id: user.department_id,
        role_level,
        data_scope: None,
    });

    Ok(next.run(req).await)
}
