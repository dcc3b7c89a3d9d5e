use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub company: String,
    /// 席位上限，0 表示不限
    #[serde(default)]
    pub max_users: i32,
    /// 租户到期时间，不填表示长期有效
    pub expire_time: Option<DateTime<Utc>>,
}

/// 修改租户信息，字段为空表示不修改
#[derive(Debug, Deserialize)]
pub struct UpdateAdminRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
    pub company: Option<String>,
    pub max_users: Option<i32>,
    /// 设为过去的时间会立即停用整个租户
    pub expire_time: Option<DateTime<Utc>>,
}
