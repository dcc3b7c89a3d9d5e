use axum::{
    Router,
    routing::{get, put},
};

use crate::AppState;

mod handler;
mod model;

pub use handler::{
    assign_menus, assign_permissions, create_role, delete_role, list_roles, update_role,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}", put(update_role).delete(delete_role))
        .route("/roles/{id}/permissions", put(assign_permissions))
        .route("/roles/{id}/menus", put(assign_menus))
}
