use serde::{Deserialize, Serialize};

use crate::models::{User, UserStatus};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub keyword: Option<String>,
}

impl UserListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub list: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub department_id: i64,
    #[serde(default)]
    pub role_ids: Vec<i64>,
    /// 仅超级管理员可指定，其他人固定为自己的租户
    pub tenant_id: Option<i64>,
}

/// 资料修改，字段为空表示不修改
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
    pub department_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResetUserPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRolesRequest {
    pub role_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignMenusRequest {
    pub menu_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}
