use axum::{Router, routing::get};

use crate::AppState;

mod handler;

pub use handler::list_departments;

pub fn routes() -> Router<AppState> {
    Router::new().route("/departments", get(list_departments))
}
