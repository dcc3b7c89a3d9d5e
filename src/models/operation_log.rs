use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 受保护接口上的一次写操作
///
/// 不记录请求体和响应体，其中可能包含密码等敏感字段。
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OperationLog {
    pub tenant_id: i64,
    pub user_id: i64,
    pub method: String,
    pub path: String,
    pub status: i32,
    pub ip: String,
    pub user_agent: String,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}
