use axum::{extract::State, response::IntoResponse};

use crate::AppState;
use crate::auth::AuthContext;
use crate::error::AppError;
use crate::utils::success_to_api_response;

#[axum::debug_handler]
pub async fn list_departments(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    // 选择用户所属部门时也要用到部门列表
    ctx.require_any_permission(&state.permissions, &["dept:list", "system:user:list"])
        .await?;
    let mut departments = state
        .repo
        .list_departments(ctx.tenant_scope().tenant_filter())
        .await?;

    // 按部门过滤的数据范围只返回可见部门
    if let Some(visible) = ctx.data_scope().departments {
        departments.retain(|d| visible.contains(&d.id));
    }
    departments.sort_by_key(|d| (d.parent_id, d.sort, d.id));
    Ok(success_to_api_response(departments))
}
