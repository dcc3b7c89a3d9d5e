use axum::{
    extract::{Json, State},
    response::IntoResponse,
};

use super::model::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse,
    ResetPasswordRequest, TotpCodeRequest, UserInfoResponse, VerifyTotpRequest,
};
use crate::AppState;
use crate::auth::{AuthContext, LoginAttempt, login::PASSWORD_RESET_SENT};
use crate::error::AppError;
use crate::utils::{ClientMeta, message_to_api_response, success_to_api_response};

const LOGIN_HISTORY_LIMIT: i64 = 20;

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .login
        .login(LoginAttempt {
            username: req.username.trim().to_string(),
            password: req.password,
            ip: client.ip,
            user_agent: client.user_agent,
        })
        .await?;
    Ok(success_to_api_response(LoginResponse::from(outcome)))
}

#[axum::debug_handler]
pub async fn verify_totp(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(req): Json<VerifyTotpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state
        .login
        .verify_totp(&req.temp_token, req.code.trim(), &client.ip, &client.user_agent)
        .await?;
    Ok(success_to_api_response(LoginResponse::from(issued)))
}

#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.login.forgot_password(&req.email).await?;
    Ok(message_to_api_response(PASSWORD_RESET_SENT))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .login
        .reset_password(&req.email, req.code.trim(), &req.new_password)
        .await?;
    Ok(message_to_api_response("密码重置成功"))
}

#[axum::debug_handler]
pub async fn user_info(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .repo
        .find_user(ctx.user_id())
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
    let roles = state
        .repo
        .roles_of_user(user.id)
        .await?
        .into_iter()
        .map(|r| r.code)
        .collect();
    let permissions = state
        .permissions
        .effective_permission_codes(user.id)
        .await?
        .into_iter()
        .collect();

    Ok(success_to_api_response(UserInfoResponse {
        user,
        roles,
        role_level: ctx.role_level,
        permissions,
        data_scope: ctx.data_scope(),
    }))
}

/// 前端按钮级权限编码
#[axum::debug_handler]
pub async fn permission_codes(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let codes: Vec<String> = state
        .permissions
        .effective_permission_codes(ctx.user_id())
        .await?
        .into_iter()
        .collect();
    Ok(success_to_api_response(codes))
}

/// 本人最近的登录记录
#[axum::debug_handler]
pub async fn login_history(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let logs = state
        .repo
        .recent_login_logs(ctx.user_id(), LOGIN_HISTORY_LIMIT)
        .await?;
    Ok(success_to_api_response(logs))
}

#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state.login.logout(&ctx.token).await?;
    Ok(message_to_api_response("已退出登录"))
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.tokens.refresh_session_token(&ctx.claims)?;
    Ok(success_to_api_response(LoginResponse::from(issued)))
}

#[axum::debug_handler]
pub async fn change_password(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .login
        .change_password(ctx.user_id(), &req.old_password, &req.new_password)
        .await?;
    Ok(message_to_api_response("密码修改成功"))
}

#[axum::debug_handler]
pub async fn generate_totp(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.login.begin_totp_enrollment(ctx.user_id()).await?;
    Ok(success_to_api_response(enrollment))
}

#[axum::debug_handler]
pub async fn bind_totp(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<TotpCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .login
        .confirm_totp_enrollment(ctx.user_id(), req.code.trim())
        .await?;
    Ok(message_to_api_response("两步验证已开启"))
}

#[axum::debug_handler]
pub async fn disable_totp(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<TotpCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.login.disable_totp(ctx.user_id(), req.code.trim()).await?;
    Ok(message_to_api_response("两步验证已关闭"))
}
