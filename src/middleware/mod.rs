mod auth;
mod data_scope;
mod error_handler;
mod operation_log;
mod permission;
mod rate_limit;

pub use auth::{auth_middleware, bearer_token};
pub use data_scope::data_scope_middleware;
pub use error_handler::log_errors;
pub use operation_log::operation_log_middleware;
pub use permission::api_permission_middleware;
pub use rate_limit::{RateLimiter, rate_limit};
