use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 账号状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Disabled = 0,
    Active = 1,
    Locked = 2,
}

/// 管理员级别，决定角色级别的短路判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum AdminTier {
    Normal = 0,
    TenantAdmin = 1,
    SuperAdmin = 2,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub tenant_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: String,
    pub phone: String,
    pub nickname: String,
    pub department_id: i64,
    pub status: UserStatus,
    pub admin_tier: AdminTier,
    pub totp_enabled: bool,
    #[serde(skip_serializing)]
    pub totp_secret: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: String,
    pub login_count: i64,
    /// 租户到期时间，只在租户管理员行上有意义
    pub expire_time: Option<DateTime<Utc>>,
    /// 租户席位上限，0 表示不限
    pub max_users: i32,
    pub company: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_super_admin_tier(&self) -> bool {
        self.admin_tier == AdminTier::SuperAdmin
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// 新建用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: i64,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub phone: String,
    pub nickname: String,
    pub department_id: i64,
    pub admin_tier: AdminTier,
    pub max_users: i32,
    pub expire_time: Option<DateTime<Utc>>,
    pub company: String,
    pub role_ids: Vec<i64>,
    /// 创建租户管理员时为 true：在同一事务里把 tenant_id 改成新用户自己的 id
    pub promote_to_own_tenant: bool,
}

/// 用户列表过滤条件
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// None 表示不按租户过滤（超级管理员）
    pub tenant_id: Option<i64>,
    /// None 表示不按部门过滤，Some(空) 表示无可见部门
    pub department_ids: Option<Vec<i64>>,
    /// 仅本人数据
    pub only_user_id: Option<i64>,
    /// 按管理员级别过滤，租户管理员列表使用
    pub admin_tier: Option<AdminTier>,
    pub keyword: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

/// 登录成功后更新的字段
#[derive(Debug, Clone)]
pub struct LoginInfo {
    pub at: DateTime<Utc>,
    pub ip: String,
}
