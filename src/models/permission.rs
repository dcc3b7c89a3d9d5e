use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Menu = 1,
    Button = 2,
    Api = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    /// 全局唯一，运行时只检查这个编码
    pub code: String,
    pub kind: PermissionKind,
    /// 仅 API 权限使用
    pub method: String,
    pub path: String,
}

/// API 权限匹配所需的最小投影
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ApiPermission {
    pub code: String,
    pub method: String,
    pub path: String,
}
