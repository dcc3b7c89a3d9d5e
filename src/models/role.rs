use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

pub const SUPER_ADMIN_CODE: &str = "super_admin";
pub const ADMIN_CODE: &str = "admin";
pub const USER_CODE: &str = "user";

/// 角色级别，数值越小权限越大
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RoleLevel {
    SuperAdmin = 0,
    Admin = 1,
    User = 2,
    Custom = 99,
}

impl RoleLevel {
    /// 角色编码到级别的唯一映射，其它编码一律视为租户自定义角色
    pub fn from_code(code: &str) -> Self {
        match code {
            SUPER_ADMIN_CODE => RoleLevel::SuperAdmin,
            ADMIN_CODE => RoleLevel::Admin,
            USER_CODE => RoleLevel::User,
            _ => RoleLevel::Custom,
        }
    }

    pub fn value(self) -> i32 {
        self as i32
    }

    /// 创建或修改角色时校验编码
    ///
    /// 与内置编码仅在大小写、空白或连字符上不同的编码会被拒绝，
    /// 否则拼错的 `Admin` 会被当作最低级的自定义角色。
    pub fn validate_code(code: &str) -> Result<Self, AppError> {
        if code.is_empty() {
            return Err(AppError::Validation("角色编码不能为空".into()));
        }
        let level = Self::from_code(code);
        if level != RoleLevel::Custom {
            return Ok(level);
        }

        let normalized = code.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        if Self::from_code(&normalized) != RoleLevel::Custom {
            return Err(AppError::Validation(format!(
                "角色编码 {:?} 与内置角色 {} 相似，请使用准确的编码",
                code, normalized
            )));
        }
        if code.trim() != code {
            return Err(AppError::Validation("角色编码不能包含首尾空白".into()));
        }
        Ok(RoleLevel::Custom)
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// 数据权限范围，数值越小范围越大
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    All = 1,
    DeptTree = 2,
    Dept = 3,
    SelfOnly = 4,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub code: String,
    pub status: i16,
    pub sort: i32,
    pub data_scope: DataScope,
    pub remark: String,
}

impl Role {
    pub fn level(&self) -> RoleLevel {
        RoleLevel::from_code(&self.code)
    }
}

#[derive(Debug, Clone)]
pub struct RoleDraft {
    pub tenant_id: i64,
    pub name: String,
    pub code: String,
    pub status: i16,
    pub sort: i32,
    pub data_scope: DataScope,
    pub remark: String,
}
