use axum::{
    Router,
    routing::{get, put},
};

use crate::AppState;

mod handler;
pub(crate) mod model;

pub use handler::{
    assign_menus, assign_roles, create_user, delete_user, get_user, list_users,
    reset_user_password, unlock_user, update_status, update_user,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/roles", put(assign_roles))
        .route("/users/{id}/menus", put(assign_menus))
        .route("/users/{id}/status", put(update_status))
        .route("/users/{id}/unlock", put(unlock_user))
        .route("/users/{id}/reset-password", put(reset_user_password))
}
