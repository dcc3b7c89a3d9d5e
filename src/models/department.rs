use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Department {
    pub id: i64,
    pub tenant_id: i64,
    /// 0 表示顶级部门
    pub parent_id: i64,
    pub name: String,
    pub sort: i32,
    pub status: i16,
}
