use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use super::model::{
    AssignMenusRequest, AssignRolesRequest, CreateUserRequest, ResetUserPasswordRequest,
    UpdateStatusRequest, UpdateUserRequest, UserListQuery, UserPage,
};
use crate::AppState;
use crate::auth::{
    AuthContext, TenantScope, ensure_same_tenant, hash_password,
    login::{validate_new_password, validate_username},
};
use crate::error::AppError;
use crate::models::{AdminTier, NewUser, User, UserQuery, UserStatus};
use crate::utils::{message_to_api_response, success_to_api_response};

/// 加载当前租户范围内可见的用户，跨租户按不存在处理
pub(crate) async fn load_scoped_user(
    state: &AppState,
    ctx: &AuthContext,
    user_id: i64,
) -> Result<User, AppError> {
    let user = state
        .repo
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("用户不存在".into()))?;
    ensure_same_tenant(&ctx.tenant_scope(), user.tenant_id, "用户")?;
    Ok(user)
}

/// 修改他人时要求操作者级别严格高于目标用户
async fn ensure_can_manage(
    state: &AppState,
    ctx: &AuthContext,
    target: &User,
) -> Result<(), AppError> {
    if target.id == ctx.user_id() {
        return Err(AppError::forbidden("不能对自己执行此操作"));
    }
    if !state
        .permissions
        .has_higher_level(ctx.user_id(), target.id)
        .await?
    {
        return Err(AppError::forbidden("只能管理级别低于自己的用户"));
    }
    Ok(())
}

/// 角色必须存在、对当前租户可见，且级别低于操作者
///
/// 全局角色（tenant_id = 0）对所有租户可见。
pub(crate) async fn ensure_assignable_roles(
    state: &AppState,
    ctx: &AuthContext,
    scope: &TenantScope,
    role_ids: &[i64],
) -> Result<(), AppError> {
    for role_id in role_ids {
        let role = state
            .repo
            .find_role(*role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("角色{}不存在", role_id)))?;
        if role.tenant_id != 0 {
            ensure_same_tenant(scope, role.tenant_id, "角色")?;
        }
    }
    if !state
        .permissions
        .can_assign_roles(ctx.user_id(), role_ids)
        .await?
    {
        return Err(AppError::forbidden("不能分配同级或更高级别的角色"));
    }
    Ok(())
}

/// 用户列表：租户隔离 + 数据范围
#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ctx.data_scope();
    let only_user_id = filter.owner_only().then(|| ctx.user_id());

    let (page, page_size) = (query.page(), query.page_size());
    let (list, total) = state
        .repo
        .list_users(&UserQuery {
            tenant_id: ctx.tenant_scope().tenant_filter(),
            department_ids: filter.departments,
            only_user_id,
            admin_tier: None,
            keyword: query.keyword.filter(|k| !k.trim().is_empty()),
            page,
            page_size,
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
pub async fn create_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = req.username.trim().to_string();
    validate_username(&username)?;
    validate_new_password(&req.password)?;

    let tenant_id = match (ctx.is_super_admin(), req.tenant_id) {
        (true, Some(tenant_id)) => tenant_id,
        _ => ctx.tenant_id(),
    };
    let scope = TenantScope::Tenant(tenant_id);

    if !req.role_ids.is_empty() {
        ensure_assignable_roles(&state, &ctx, &scope, &req.role_ids).await?;
    }

    let nickname = if req.nickname.trim().is_empty() {
        username.clone()
    } else {
        req.nickname.trim().to_string()
    };
    let user = state
        .repo
        .create_user(NewUser {
            tenant_id,
            username,
            password_hash: hash_password(&req.password)?,
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            nickname,
            department_id: req.department_id,
            admin_tier: AdminTier::Normal,
            max_users: 0,
            expire_time: None,
            company: String::new(),
            role_ids: req.role_ids,
            promote_to_own_tenant: false,
        })
        .await?;

    info!(operator = ctx.user_id(), user_id = user.id, tenant_id, "user created");
    Ok((StatusCode::CREATED, success_to_api_response(user)))
}

/// 用户详情：本人可直接查看，查看他人要求级别更高
#[axum::debug_handler]
pub async fn get_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let target = load_scoped_user(&state, &ctx, user_id).await?;
    if target.id != ctx.user_id() {
        ensure_can_manage(&state, &ctx, &target).await?;
    }
    Ok(success_to_api_response(target))
}

/// 修改资料，未传的字段保持不变
#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut target = load_scoped_user(&state, &ctx, user_id).await?;
    ensure_can_manage(&state, &ctx, &target).await?;

    if let Some(email) = req.email {
        let email = email.trim().to_string();
        if !email.is_empty() && !email.contains('@') {
            return Err(AppError::Validation("请输入有效的邮箱地址".into()));
        }
        target.email = email;
    }
    if let Some(phone) = req.phone {
        target.phone = phone.trim().to_string();
    }
    if let Some(nickname) = req.nickname.filter(|n| !n.trim().is_empty()) {
        target.nickname = nickname.trim().to_string();
    }
    if let Some(department_id) = req.department_id {
        // 部门只能选目标用户所在租户的
        if department_id != 0
            && !state
                .repo
                .list_departments(Some(target.tenant_id))
                .await?
                .iter()
                .any(|d| d.id == department_id)
        {
            return Err(AppError::NotFound("部门不存在".into()));
        }
        target.department_id = department_id;
    }

    let user = state.repo.update_user(&target).await?;
    state.permissions.invalidate_user(user.id).await?;

    info!(operator = ctx.user_id(), user_id = user.id, "user updated");
    Ok(success_to_api_response(user))
}

/// 管理员重置他人密码，同时清掉登录失败计数
#[axum::debug_handler]
pub async fn reset_user_password(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
    Json(req): Json<ResetUserPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = load_scoped_user(&state, &ctx, user_id).await?;
    ensure_can_manage(&state, &ctx, &target).await?;
    validate_new_password(&req.password)?;

    let hashed = hash_password(&req.password)?;
    state.repo.update_password(target.id, &hashed).await?;
    state.login_guard.clear_failures(&target.username).await?;

    info!(operator = ctx.user_id(), user_id = target.id, "user password reset by admin");
    Ok(message_to_api_response("密码已重置"))
}

/// 整体替换用户的角色
#[axum::debug_handler]
pub async fn assign_roles(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
    Json(req): Json<AssignRolesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = load_scoped_user(&state, &ctx, user_id).await?;
    ensure_can_manage(&state, &ctx, &target).await?;

    // 只能分配目标用户所在租户的角色
    let scope = TenantScope::Tenant(target.tenant_id);
    ensure_assignable_roles(&state, &ctx, &scope, &req.role_ids).await?;

    state.repo.replace_user_roles(target.id, &req.role_ids).await?;
    state.permissions.invalidate_user(target.id).await?;

    info!(
        operator = ctx.user_id(),
        user_id = target.id,
        roles = ?req.role_ids,
        "user roles replaced"
    );
    Ok(message_to_api_response("角色分配成功"))
}

/// 整体替换用户的个人菜单
#[axum::debug_handler]
pub async fn assign_menus(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
    Json(req): Json<AssignMenusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = load_scoped_user(&state, &ctx, user_id).await?;
    ensure_can_manage(&state, &ctx, &target).await?;

    state.repo.replace_user_menus(target.id, &req.menu_ids).await?;
    Ok(message_to_api_response("菜单分配成功"))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = load_scoped_user(&state, &ctx, user_id).await?;
    ensure_can_manage(&state, &ctx, &target).await?;

    state.repo.update_user_status(target.id, req.status).await?;
    if req.status == UserStatus::Active {
        state.login_guard.unlock(&target.username).await?;
    }

    info!(
        operator = ctx.user_id(),
        user_id = target.id,
        status = ?req.status,
        "user status changed"
    );
    Ok(message_to_api_response("状态更新成功"))
}

/// 解除登录失败锁定和闲置锁定
#[axum::debug_handler]
pub async fn unlock_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ctx.require_permission(&state.permissions, "system:user:unlock")
        .await?;
    let target = load_scoped_user(&state, &ctx, user_id).await?;
    ensure_can_manage(&state, &ctx, &target).await?;

    if target.status == UserStatus::Locked {
        state
            .repo
            .update_user_status(target.id, UserStatus::Active)
            .await?;
    }
    state.login_guard.unlock(&target.username).await?;

    info!(operator = ctx.user_id(), user_id = target.id, "user unlocked");
    Ok(message_to_api_response("解锁成功"))
}

#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let target = load_scoped_user(&state, &ctx, user_id).await?;
    ensure_can_manage(&state, &ctx, &target).await?;

    state
        .repo
        .soft_delete_user(target.id, state.clock.now())
        .await?;
    state.permissions.invalidate_user(target.id).await?;

    info!(operator = ctx.user_id(), user_id = target.id, "user deleted");
    Ok(message_to_api_response("删除成功"))
}
