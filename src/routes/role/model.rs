use serde::Deserialize;

use crate::models::DataScope;

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: String,
    pub code: String,
    #[serde(default = "default_status")]
    pub status: i16,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_data_scope")]
    pub data_scope: DataScope,
    #[serde(default)]
    pub remark: String,
    /// 仅超级管理员可指定，0 表示全局角色
    pub tenant_id: Option<i64>,
}

fn default_status() -> i16 {
    1
}

fn default_data_scope() -> DataScope {
    DataScope::SelfOnly
}

#[derive(Debug, Deserialize)]
pub struct AssignPermissionsRequest {
    pub permission_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignMenusRequest {
    pub menu_ids: Vec<i64>,
}
