use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use super::model::{AssignMenusRequest, AssignPermissionsRequest, RoleRequest};
use crate::AppState;
use crate::auth::{AuthContext, ensure_same_tenant};
use crate::error::AppError;
use crate::models::{Role, RoleDraft, RoleLevel};
use crate::utils::{message_to_api_response, success_to_api_response};

/// 加载可修改的角色：全局角色只有超级管理员能改，租户角色按租户隔离
async fn load_managed_role(
    state: &AppState,
    ctx: &AuthContext,
    role_id: i64,
) -> Result<Role, AppError> {
    let role = state
        .repo
        .find_role(role_id)
        .await?
        .ok_or_else(|| AppError::NotFound("角色不存在".into()))?;
    if role.tenant_id == 0 {
        ctx.require_super_admin()?;
    } else {
        ensure_same_tenant(&ctx.tenant_scope(), role.tenant_id, "角色")?;
    }
    ensure_can_operate(state, ctx, &role.code).await?;
    Ok(role)
}

async fn ensure_can_operate(
    state: &AppState,
    ctx: &AuthContext,
    code: &str,
) -> Result<(), AppError> {
    if !state.permissions.can_operate_role(ctx.user_id(), code).await? {
        return Err(AppError::forbidden("只能操作级别低于自己的角色"));
    }
    Ok(())
}

fn draft_from(req: RoleRequest, tenant_id: i64) -> Result<RoleDraft, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("角色名称不能为空".into()));
    }
    RoleLevel::validate_code(&req.code)?;
    Ok(RoleDraft {
        tenant_id,
        name: req.name.trim().to_string(),
        code: req.code,
        status: req.status,
        sort: req.sort,
        data_scope: req.data_scope,
        remark: req.remark,
    })
}

#[axum::debug_handler]
pub async fn list_roles(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let roles = state
        .repo
        .list_roles(ctx.tenant_scope().tenant_filter())
        .await?;
    Ok(success_to_api_response(roles))
}

#[axum::debug_handler]
pub async fn create_role(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(req): Json<RoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tenant_id = match (ctx.is_super_admin(), req.tenant_id) {
        (true, Some(tenant_id)) => tenant_id,
        _ => ctx.tenant_id(),
    };
    let draft = draft_from(req, tenant_id)?;
    ensure_can_operate(&state, &ctx, &draft.code).await?;

    let role = state.repo.create_role(draft).await?;
    info!(operator = ctx.user_id(), role_id = role.id, code = %role.code, "role created");
    Ok((StatusCode::CREATED, success_to_api_response(role)))
}

#[axum::debug_handler]
pub async fn update_role(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(role_id): Path<i64>,
    Json(req): Json<RoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = load_managed_role(&state, &ctx, role_id).await?;
    let draft = draft_from(req, role.tenant_id)?;
    // 改编码也不能改成自己够不着的级别
    ensure_can_operate(&state, &ctx, &draft.code).await?;

    let role = state.repo.update_role(role.id, draft).await?;
    // 状态和编码都会影响持有者的权限
    state.permissions.invalidate_role(role.id).await?;

    info!(operator = ctx.user_id(), role_id = role.id, "role updated");
    Ok(success_to_api_response(role))
}

#[axum::debug_handler]
pub async fn delete_role(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(role_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let role = load_managed_role(&state, &ctx, role_id).await?;

    // 删除会清掉关联，先记下持有者
    let holders = state.repo.user_ids_with_role(role.id).await?;
    state.repo.delete_role(role.id).await?;
    for user_id in holders {
        state.permissions.invalidate_user(user_id).await?;
    }

    info!(operator = ctx.user_id(), role_id = role.id, "role deleted");
    Ok(message_to_api_response("删除成功"))
}

#[axum::debug_handler]
pub async fn assign_permissions(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(role_id): Path<i64>,
    Json(req): Json<AssignPermissionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = load_managed_role(&state, &ctx, role_id).await?;

    state
        .repo
        .replace_role_permissions(role.id, &req.permission_ids)
        .await?;
    state.permissions.invalidate_role(role.id).await?;

    info!(
        operator = ctx.user_id(),
        role_id = role.id,
        permissions = req.permission_ids.len(),
        "role permissions replaced"
    );
    Ok(message_to_api_response("权限分配成功"))
}

#[axum::debug_handler]
pub async fn assign_menus(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(role_id): Path<i64>,
    Json(req): Json<AssignMenusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = load_managed_role(&state, &ctx, role_id).await?;
    state.repo.replace_role_menus(role.id, &req.menu_ids).await?;
    Ok(message_to_api_response("菜单分配成功"))
}
