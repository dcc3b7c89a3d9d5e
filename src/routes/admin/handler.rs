use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use super::model::{CreateAdminRequest, UpdateAdminRequest};
use crate::AppState;
use crate::auth::{
    AuthContext, hash_password,
    login::{validate_new_password, validate_username},
};
use crate::error::AppError;
use crate::models::{AdminTier, NewUser, User, UserQuery};
use crate::routes::user::model::{UserListQuery, UserPage};
use crate::utils::{message_to_api_response, success_to_api_response};

/// 只接受租户管理员，其它账号一律按不存在处理
async fn load_tenant_admin(state: &AppState, admin_id: i64) -> Result<User, AppError> {
    state
        .repo
        .find_user(admin_id)
        .await?
        .filter(|u| u.admin_tier == AdminTier::TenantAdmin)
        .ok_or_else(|| AppError::NotFound("管理员不存在".into()))
}

/// 开通租户：新管理员自己就是租户，tenant_id 等于自己的 id
#[axum::debug_handler]
pub async fn create_tenant_admin(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<CreateAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_super_admin()?;

    let username = req.username.trim().to_string();
    validate_username(&username)?;
    validate_new_password(&req.password)?;
    if req.max_users < 0 {
        return Err(AppError::Validation("席位上限不能为负数".into()));
    }
    if req.expire_time.is_some_and(|t| t <= state.clock.now()) {
        return Err(AppError::Validation("到期时间必须晚于当前时间".into()));
    }

    let nickname = if req.nickname.trim().is_empty() {
        username.clone()
    } else {
        req.nickname.trim().to_string()
    };
    let admin = state
        .repo
        .create_user(NewUser {
            tenant_id: 0,
            username,
            password_hash: hash_password(&req.password)?,
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            nickname,
            department_id: 0,
            admin_tier: AdminTier::TenantAdmin,
            max_users: req.max_users,
            expire_time: req.expire_time,
            company: req.company.trim().to_string(),
            role_ids: Vec::new(),
            promote_to_own_tenant: true,
        })
        .await?;

    info!(operator = ctx.user_id(), admin_id = admin.id, "tenant admin created");
    Ok((StatusCode::CREATED, success_to_api_response(admin)))
}

#[axum::debug_handler]
pub async fn list_tenant_admins(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_super_admin()?;

    let (page, page_size) = (query.page(), query.page_size());
    let (list, total) = state
        .repo
        .list_users(&UserQuery {
            admin_tier: Some(AdminTier::TenantAdmin),
            keyword: query.keyword.filter(|k| !k.trim().is_empty()),
            page,
            page_size,
            ..UserQuery::default()
        })
        .await?;

    Ok(success_to_api_response(UserPage {
        list,
        total,
        page,
        page_size,
    }))
}

#[axum::debug_handler]
pub async fn get_tenant_admin(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(admin_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_super_admin()?;
    let admin = load_tenant_admin(&state, admin_id).await?;
    Ok(success_to_api_response(admin))
}

/// 修改租户资料、席位上限和到期时间
#[axum::debug_handler]
pub async fn update_tenant_admin(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(admin_id): Path<i64>,
    Json(req): Json<UpdateAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_super_admin()?;
    let mut admin = load_tenant_admin(&state, admin_id).await?;

    if let Some(email) = req.email {
        admin.email = email.trim().to_string();
    }
    if let Some(phone) = req.phone {
        admin.phone = phone.trim().to_string();
    }
    if let Some(nickname) = req.nickname.filter(|n| !n.trim().is_empty()) {
        admin.nickname = nickname.trim().to_string();
    }
    if let Some(company) = req.company {
        admin.company = company.trim().to_string();
    }
    if let Some(max_users) = req.max_users {
        if max_users < 0 {
            return Err(AppError::Validation("席位上限不能为负数".into()));
        }
        admin.max_users = max_users;
    }
    if req.expire_time.is_some() {
        admin.expire_time = req.expire_time;
    }

    let admin = state.repo.update_user(&admin).await?;
    state.permissions.invalidate_user(admin.id).await?;

    info!(
        operator = ctx.user_id(),
        admin_id = admin.id,
        max_users = admin.max_users,
        "tenant admin updated"
    );
    Ok(success_to_api_response(admin))
}

/// 租户下还有其他用户时不能删除
#[axum::debug_handler]
pub async fn delete_tenant_admin(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(admin_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_super_admin()?;
    let admin = load_tenant_admin(&state, admin_id).await?;

    let members = state.repo.count_tenant_users(admin.id).await?;
    if members > 1 {
        return Err(AppError::Conflict(format!(
            "租户下还有{}个其他用户，请先删除",
            members - 1
        )));
    }

    state
        .repo
        .soft_delete_user(admin.id, state.clock.now())
        .await?;
    state.permissions.invalidate_user(admin.id).await?;

    info!(operator = ctx.user_id(), admin_id = admin.id, "tenant admin deleted");
    Ok(message_to_api_response("删除成功"))
}
