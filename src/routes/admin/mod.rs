use axum::{Router, routing::get};

use crate::AppState;

mod handler;
mod model;

pub use handler::{
    create_tenant_admin, delete_tenant_admin, get_tenant_admin, list_tenant_admins,
    update_tenant_admin,
};

/// 租户管理员的开通和维护，仅超级管理员
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admins", get(list_tenant_admins).post(create_tenant_admin))
        .route(
            "/admins/{id}",
            get(get_tenant_admin)
                .put(update_tenant_admin)
                .delete(delete_tenant_admin),
        )
}
